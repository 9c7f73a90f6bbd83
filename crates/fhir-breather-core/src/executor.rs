//! Query execution pipeline.
//!
//! One call to [`QueryExecutor::answer`] binds the question to the operation,
//! performs the HTTP request against the rebound FHIR server, and then either
//! narrates the result ([`ExecutionMode::Summarized`]) or returns the raw
//! response with its intermediate steps ([`ExecutionMode::Raw`]). The two
//! modes are exclusive: getting both for one question takes two full runs.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::binding::{
    ModelNarrator, ModelParameterBinder, ParameterBinder, RequestArgs, ResponseNarrator,
};
use crate::error::ExecutionError;
use crate::llm::ChatModel;
use crate::selector::OperationDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Summarized,
    Raw,
}

/// What happened between the question and the answer.
#[derive(Debug, Clone, Serialize)]
pub struct IntermediateSteps {
    pub request_args: RequestArgs,
    pub response_text: String,
}

/// Unmodified server response, with the question that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct RawResponse {
    pub instructions: String,
    pub status: u16,
    pub intermediate_steps: IntermediateSteps,
    pub output: Value,
}

impl RawResponse {
    /// Text form handed to the ADT converter.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Result of one execution. Exactly one field is populated, per mode.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub natural_language_answer: String,
    pub raw_response: Option<RawResponse>,
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Send `Access-Control-Allow-*` headers on outbound requests.
    pub cors_headers: bool,
    /// Truncate the response text handed to the narrator.
    pub max_text_length: Option<usize>,
    /// Per-request timeout for FHIR calls. Transport defaults apply when unset.
    pub request_timeout: Option<Duration>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            cors_headers: true,
            max_text_length: None,
            request_timeout: None,
        }
    }
}

/// Fixed headers attached to every FHIR request. These are response headers
/// in CORS terms; servers ignore them on requests.
pub const CORS_HEADERS: [(&str, &str); 2] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Credentials", "true"),
];

struct Exchange {
    args: RequestArgs,
    status: u16,
    response_text: String,
}

pub struct QueryExecutor {
    http: reqwest::Client,
    binder: Arc<dyn ParameterBinder>,
    narrator: Arc<dyn ResponseNarrator>,
    options: ExecutorOptions,
}

impl QueryExecutor {
    pub fn new(binder: Arc<dyn ParameterBinder>, narrator: Arc<dyn ResponseNarrator>) -> Self {
        Self {
            http: reqwest::Client::new(),
            binder,
            narrator,
            options: ExecutorOptions::default(),
        }
    }

    /// Executor whose binding and narration both go through `model`.
    pub fn with_model(model: Arc<dyn ChatModel>) -> Self {
        Self::new(
            Arc::new(ModelParameterBinder::new(Arc::clone(&model))),
            Arc::new(ModelNarrator::new(model)),
        )
    }

    #[must_use]
    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    #[instrument(skip(self, operation), fields(operation = %operation.label()))]
    pub async fn answer(
        &self,
        query: &str,
        operation: &OperationDescriptor,
        mode: ExecutionMode,
    ) -> Result<QueryResult, ExecutionError> {
        match mode {
            ExecutionMode::Summarized => {
                let exchange = self.exchange(query, operation).await?;
                let text = truncate_chars(&exchange.response_text, self.options.max_text_length);
                let answer = self.narrator.summarize(query, text).await?;
                if answer.trim().is_empty() {
                    warn!("Narrator returned an empty answer");
                    return Err(ExecutionError::EmptyAnswer);
                }
                Ok(QueryResult {
                    natural_language_answer: answer,
                    raw_response: None,
                })
            }
            ExecutionMode::Raw => Ok(QueryResult {
                natural_language_answer: String::new(),
                raw_response: Some(self.raw_response(query, operation).await?),
            }),
        }
    }

    /// Run the pipeline without narration and keep the unmodified response.
    pub async fn raw_response(
        &self,
        query: &str,
        operation: &OperationDescriptor,
    ) -> Result<RawResponse, ExecutionError> {
        let exchange = self.exchange(query, operation).await?;
        let output = serde_json::from_str(&exchange.response_text)
            .unwrap_or_else(|_| Value::String(exchange.response_text.clone()));
        Ok(RawResponse {
            instructions: query.to_string(),
            status: exchange.status,
            intermediate_steps: IntermediateSteps {
                request_args: exchange.args,
                response_text: exchange.response_text,
            },
            output,
        })
    }

    /// Bind, validate and send. Shared by both modes.
    async fn exchange(
        &self,
        query: &str,
        operation: &OperationDescriptor,
    ) -> Result<Exchange, ExecutionError> {
        if query.trim().is_empty() {
            return Err(ExecutionError::EmptyQuery);
        }

        let args = self.binder.bind_parameters(query, operation).await?;
        args.validate(operation)?;

        let (status, response_text) = self.call(operation, &args).await?;
        info!(
            status,
            bytes = response_text.len(),
            "FHIR request completed"
        );
        Ok(Exchange {
            args,
            status,
            response_text,
        })
    }

    async fn call(
        &self,
        operation: &OperationDescriptor,
        args: &RequestArgs,
    ) -> Result<(u16, String), ExecutionError> {
        let url = build_url(operation, args)?;
        debug!(method = %operation.method, %url, "Sending FHIR request");

        let mut req = self
            .http
            .request(operation.method.to_reqwest(), url)
            .query(&query_pairs(args))
            .header("Accept", "application/fhir+json");
        if self.options.cors_headers {
            for (name, value) in CORS_HEADERS {
                req = req.header(name, value);
            }
        }
        if let Some(timeout) = self.options.request_timeout {
            req = req.timeout(timeout);
        }
        for (name, value) in &args.header_params {
            req = req.header(name.as_str(), value_to_param(value));
        }
        if let Some(body) = &args.body {
            req = req
                .header("Content-Type", "application/fhir+json")
                .json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ExecutionError::Request(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ExecutionError::Request(e.to_string()))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "FHIR server returned an error");
            return Err(ExecutionError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok((status.as_u16(), text))
    }
}

/// Join the operation's base URL and path template, filling path parameters.
pub fn build_url(
    operation: &OperationDescriptor,
    args: &RequestArgs,
) -> Result<Url, ExecutionError> {
    let base = operation
        .base_url
        .as_deref()
        .ok_or_else(|| ExecutionError::InvalidUrl("no base URL for operation".into()))?;

    let mut path = operation.path.clone();
    for (name, value) in &args.path_params {
        let encoded = urlencoding::encode(&value_to_param(value)).into_owned();
        path = path.replace(&format!("{{{name}}}"), &encoded);
    }
    if let Some(start) = path.find('{')
        && let Some(len) = path[start..].find('}')
    {
        return Err(ExecutionError::MissingParameter {
            name: path[start + 1..start + len].to_string(),
        });
    }

    let joined = format!("{}{}", base.trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|e| ExecutionError::InvalidUrl(format!("{joined}: {e}")))
}

/// Flatten query arguments; arrays become repeated parameters, nulls are dropped.
fn query_pairs(args: &RequestArgs) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (name, value) in &args.query_params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                pairs.extend(items.iter().map(|v| (name.clone(), value_to_param(v))));
            }
            other => pairs.push((name.clone(), value_to_param(other))),
        }
    }
    pairs
}

fn value_to_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_chars(text: &str, max: Option<usize>) -> &str {
    match max {
        Some(max) => text.char_indices().nth(max).map_or(text, |(i, _)| &text[..i]),
        None => text,
    }
}
