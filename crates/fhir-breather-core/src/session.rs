//! Interactive session context.
//!
//! Everything one user session accumulates lives here and is passed by
//! reference into each stage: credentials, the loaded spec, the selected
//! operation, the last question and its answer, and the UI flags.

use tracing::info;

use crate::adt::{AdtConverter, AdtOutcome};
use crate::config::{ConfigStatus, Credentials};
use crate::error::{ConfigError, ExecutionError, Result, SessionError};
use crate::executor::{ExecutionMode, QueryExecutor, RawResponse};
use crate::openapi::{HttpMethod, OpenApiSpec, SpecLoader};
use crate::selector::{OperationDescriptor, resolve_operation};

/// Session progress. Each state requires its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configured,
    OperationSelected,
    Answered,
    ConvertedToAdt,
}

/// UI gating flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    pub submitted: bool,
    pub search_performed: bool,
}

#[derive(Debug, Default)]
pub struct Session {
    credentials: Credentials,
    flags: SessionFlags,
    spec: Option<OpenApiSpec>,
    operation: Option<OperationDescriptor>,
    last_query: Option<String>,
    last_answer: Option<String>,
    last_raw: Option<RawResponse>,
    last_adt: Option<String>,
}

impl Session {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            ..Self::default()
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Replace credentials; everything derived from the old ones is dropped.
    pub fn set_credentials(&mut self, credentials: Credentials) {
        *self = Self::new(credentials);
    }

    pub fn status(&self) -> ConfigStatus {
        self.credentials.status()
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn state(&self) -> SessionState {
        if self.last_adt.is_some() {
            SessionState::ConvertedToAdt
        } else if self.last_answer.is_some() {
            SessionState::Answered
        } else if self.operation.is_some() {
            SessionState::OperationSelected
        } else if self.spec.is_some() {
            SessionState::Configured
        } else {
            SessionState::Idle
        }
    }

    pub fn spec(&self) -> Option<&OpenApiSpec> {
        self.spec.as_ref()
    }

    pub fn operation(&self) -> Option<&OperationDescriptor> {
        self.operation.as_ref()
    }

    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    pub fn last_answer(&self) -> Option<&str> {
        self.last_answer.as_deref()
    }

    pub fn last_raw(&self) -> Option<&RawResponse> {
        self.last_raw.as_ref()
    }

    pub fn last_adt(&self) -> Option<&str> {
        self.last_adt.as_deref()
    }

    /// Fetch the spec and bind it to the session's FHIR server.
    pub async fn load_spec(&mut self, loader: &SpecLoader) -> Result<&OpenApiSpec> {
        self.credentials.require_configured()?;
        let base_url = self
            .credentials
            .fhir_base_url()
            .ok_or(ConfigError::MissingFhirBaseUrl)?;
        let spec = loader.load(base_url).await?;
        Ok(self.install_spec(spec))
    }

    /// Use an already loaded spec, rebinding it to the session's FHIR server.
    pub fn attach_spec(&mut self, mut spec: OpenApiSpec) -> Result<&OpenApiSpec> {
        self.credentials.require_configured()?;
        if let Some(url) = self.credentials.fhir_base_url() {
            spec.set_base_url(url);
        }
        Ok(self.install_spec(spec))
    }

    fn install_spec(&mut self, spec: OpenApiSpec) -> &OpenApiSpec {
        self.operation = None;
        self.reset_answer();
        self.spec.insert(spec)
    }

    pub fn select_operation(
        &mut self,
        path: &str,
        method: HttpMethod,
    ) -> Result<&OperationDescriptor> {
        let spec = self.spec.as_ref().ok_or(SessionError::SpecNotLoaded)?;
        let operation = resolve_operation(spec, path, method)?;
        info!(operation = %operation.label(), "Operation selected");
        self.reset_answer();
        Ok(self.operation.insert(operation))
    }

    /// The query text changed; a previous submission no longer applies.
    pub fn clear_submit(&mut self) {
        self.flags.submitted = false;
    }

    /// Answer `query` in prose. On failure the answer state is not advanced.
    pub async fn search(&mut self, executor: &QueryExecutor, query: &str) -> Result<String> {
        let operation = self
            .operation
            .as_ref()
            .ok_or(SessionError::NoOperationSelected)?;
        if !self.credentials.is_key_configured() {
            return Err(ConfigError::KeyNotConfigured.into());
        }
        if query.trim().is_empty() {
            return Err(ExecutionError::EmptyQuery.into());
        }
        self.credentials.require_configured()?;

        self.flags.submitted = true;
        let result = executor
            .answer(query, operation, ExecutionMode::Summarized)
            .await?;

        self.last_query = Some(query.to_string());
        self.last_answer = Some(result.natural_language_answer.clone());
        self.last_raw = None;
        self.last_adt = None;
        self.flags.search_performed = true;
        Ok(result.natural_language_answer)
    }

    /// Re-run the last query in raw mode and convert the response to ADT.
    ///
    /// Execution failures propagate. Conversion failures come back as
    /// [`AdtOutcome::Failed`] and leave the answer untouched.
    pub async fn convert(
        &mut self,
        executor: &QueryExecutor,
        converter: &AdtConverter,
    ) -> Result<AdtOutcome> {
        if !self.flags.search_performed {
            return Err(SessionError::NoSearchPerformed.into());
        }
        let operation = self
            .operation
            .as_ref()
            .ok_or(SessionError::NoOperationSelected)?;
        let query = self
            .last_query
            .as_deref()
            .ok_or(SessionError::NoSearchPerformed)?;

        let raw = executor.raw_response(query, operation).await?;
        let outcome = converter.convert_response(&raw).await;
        self.last_raw = Some(raw);
        self.last_adt = match &outcome {
            AdtOutcome::Message(message) => Some(message.clone()),
            AdtOutcome::Failed(_) => None,
        };
        Ok(outcome)
    }

    fn reset_answer(&mut self) {
        self.flags = SessionFlags::default();
        self.last_query = None;
        self.last_answer = None;
        self.last_raw = None;
        self.last_adt = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BreatherError;

    const DOC: &str = r#"{"paths": {"/Patient": {"get": {}}, "/Observation": {"get": {}}}}"#;

    fn configured() -> Credentials {
        Credentials::default()
            .with_api_key("sk-test")
            .with_fhir_base_url("http://localhost:8080/fhir")
    }

    #[test]
    fn starts_idle() {
        let session = Session::new(configured());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.flags(), SessionFlags::default());
    }

    #[test]
    fn attach_spec_requires_credentials() {
        let mut session = Session::new(Credentials::default().with_api_key("sk-test"));
        let spec = OpenApiSpec::from_json_str(DOC).unwrap();
        let err = session.attach_spec(spec).unwrap_err();
        assert!(matches!(
            err,
            BreatherError::Config(ConfigError::MissingFhirBaseUrl)
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn attach_spec_rebinds_base_url() {
        let mut session = Session::new(configured());
        let spec = session
            .attach_spec(OpenApiSpec::from_json_str(DOC).unwrap())
            .unwrap();
        assert_eq!(spec.base_url(), Some("http://localhost:8080/fhir"));
        assert_eq!(session.state(), SessionState::Configured);
    }

    #[test]
    fn select_requires_spec() {
        let mut session = Session::new(configured());
        let err = session.select_operation("/Patient", HttpMethod::Get).unwrap_err();
        assert!(matches!(
            err,
            BreatherError::Session(SessionError::SpecNotLoaded)
        ));
    }

    #[test]
    fn select_invalid_pair_keeps_state() {
        let mut session = Session::new(configured());
        session
            .attach_spec(OpenApiSpec::from_json_str(DOC).unwrap())
            .unwrap();
        let err = session
            .select_operation("/Patient", HttpMethod::Delete)
            .unwrap_err();
        assert!(matches!(err, BreatherError::Selection(_)));
        assert_eq!(session.state(), SessionState::Configured);

        let op = session.select_operation("/Observation", HttpMethod::Get).unwrap();
        assert_eq!(op.path, "/Observation");
        assert_eq!(session.state(), SessionState::OperationSelected);
    }

    #[test]
    fn clear_submit_resets_flag() {
        let mut session = Session::new(configured());
        session.flags.submitted = true;
        session.clear_submit();
        assert!(!session.flags().submitted);
    }

    #[test]
    fn set_credentials_resets_session() {
        let mut session = Session::new(configured());
        session
            .attach_spec(OpenApiSpec::from_json_str(DOC).unwrap())
            .unwrap();
        session.set_credentials(Credentials::default());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.status().api_key_added);
    }
}
