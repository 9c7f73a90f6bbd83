//! Query-to-request binding and response narration.
//!
//! [`ParameterBinder`] turns a natural-language question into concrete
//! arguments for an [`OperationDescriptor`]; [`ResponseNarrator`] turns the
//! server's answer back into prose. The default implementations ask a
//! [`ChatModel`].

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ExecutionError;
use crate::llm::{ChatMessage, ChatModel, strip_code_fence};
use crate::openapi::ParameterLocation;
use crate::selector::OperationDescriptor;

/// Concrete arguments for one operation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestArgs {
    #[serde(default)]
    pub path_params: IndexMap<String, Value>,
    #[serde(default)]
    pub query_params: IndexMap<String, Value>,
    #[serde(default)]
    pub header_params: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestArgs {
    #[must_use]
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Check the arguments against the operation's declared parameters.
    pub fn validate(&self, operation: &OperationDescriptor) -> Result<(), ExecutionError> {
        let groups = [
            (ParameterLocation::Path, &self.path_params),
            (ParameterLocation::Query, &self.query_params),
            (ParameterLocation::Header, &self.header_params),
        ];

        for (location, values) in groups {
            if let Some(name) = values
                .keys()
                .find(|name| operation.parameter(name, location).is_none())
            {
                return Err(ExecutionError::UnknownParameter {
                    name: format!("{name} ({location})"),
                });
            }
            for param in operation.parameters_in(location).filter(|p| p.required) {
                let present = values.get(&param.name).is_some_and(|v| !v.is_null());
                if !present {
                    return Err(ExecutionError::MissingParameter {
                        name: param.name.clone(),
                    });
                }
            }
        }

        if self.body.is_some() && !operation.accepts_body() {
            return Err(ExecutionError::Binding(format!(
                "{} does not accept a request body",
                operation.label()
            )));
        }
        Ok(())
    }
}

/// Decides how to fill an operation's parameters from a question.
#[async_trait]
pub trait ParameterBinder: Send + Sync {
    async fn bind_parameters(
        &self,
        query: &str,
        operation: &OperationDescriptor,
    ) -> Result<RequestArgs, ExecutionError>;
}

/// Narrates an API response as an answer to the question.
#[async_trait]
pub trait ResponseNarrator: Send + Sync {
    async fn summarize(&self, query: &str, response_text: &str) -> Result<String, ExecutionError>;
}

const BINDING_INSTRUCTIONS: &str = "\
You translate a user's question into the arguments of one HTTP API operation.
You are given the operation as JSON: its path, method, declared parameters and schemas.
Reply with a single JSON object and nothing else, using exactly these keys:
  \"path_params\": object of path parameter values,
  \"query_params\": object of query parameter values,
  \"header_params\": object of header parameter values,
  \"body\": request body object, or null when the operation takes no body.
Only use parameter names the operation declares. Omit parameters the question does not need.
Every required parameter must be given a value.";

const NARRATION_INSTRUCTIONS: &str = "\
You are a helpful assistant that answers questions using the response of a FHIR API call.
Answer the user's question in clear prose based only on the API response.
If the response does not contain the answer, say so plainly.";

/// Binds parameters by asking the model for a JSON argument object.
pub struct ModelParameterBinder {
    model: Arc<dyn ChatModel>,
}

impl ModelParameterBinder {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    fn prompt(
        query: &str,
        operation: &OperationDescriptor,
    ) -> Result<Vec<ChatMessage>, ExecutionError> {
        let op_json = serde_json::to_string_pretty(operation)
            .map_err(|e| ExecutionError::Binding(e.to_string()))?;
        Ok(vec![
            ChatMessage::system(BINDING_INSTRUCTIONS),
            ChatMessage::user(format!("Operation:\n{op_json}\n\nQuestion: {query}")),
        ])
    }
}

#[async_trait]
impl ParameterBinder for ModelParameterBinder {
    async fn bind_parameters(
        &self,
        query: &str,
        operation: &OperationDescriptor,
    ) -> Result<RequestArgs, ExecutionError> {
        let messages = Self::prompt(query, operation)?;
        let reply = self.model.complete(&messages).await?;
        debug!(operation = %operation.label(), reply = %reply, "Model bound parameters");
        parse_request_args(&reply)
    }
}

/// Parse a model reply into [`RequestArgs`], tolerating a code fence.
pub fn parse_request_args(reply: &str) -> Result<RequestArgs, ExecutionError> {
    let text = strip_code_fence(reply);
    let mut args: RequestArgs = serde_json::from_str(text).map_err(|e| {
        ExecutionError::Binding(format!("model reply is not valid arguments JSON: {e}"))
    })?;
    if args.body.as_ref().is_some_and(Value::is_null) {
        args.body = None;
    }
    Ok(args)
}

/// Narrates responses through the model.
pub struct ModelNarrator {
    model: Arc<dyn ChatModel>,
}

impl ModelNarrator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ResponseNarrator for ModelNarrator {
    async fn summarize(&self, query: &str, response_text: &str) -> Result<String, ExecutionError> {
        let messages = vec![
            ChatMessage::system(NARRATION_INSTRUCTIONS),
            ChatMessage::user(format!(
                "Question: {query}\n\nAPI response:\n{response_text}"
            )),
        ];
        let answer = self.model.complete(&messages).await?;
        Ok(answer.trim().to_string())
    }
}
