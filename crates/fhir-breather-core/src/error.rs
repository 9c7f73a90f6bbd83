use thiserror::Error;

/// Missing or malformed session credentials.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("OpenAI API key is not configured")]
    MissingApiKey,

    #[error("FHIR server base URL is not configured")]
    MissingFhirBaseUrl,

    #[error("Please configure your OpenAI API Key!")]
    KeyNotConfigured,
}

/// Failure to fetch or parse the OpenAPI document.
#[derive(Debug, Error)]
pub enum SpecLoadError {
    #[error("Failed to fetch OpenAPI spec from {url}: {message}")]
    Request { url: String, message: String },

    #[error("OpenAPI spec request to {url} returned HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("Failed to parse OpenAPI spec: {0}")]
    Parse(String),
}

/// A path/method pair that is not part of the loaded spec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Path not found in spec: {0}")]
    UnknownPath(String),

    #[error("Method {method} is not supported for path {path}")]
    UnsupportedMethod { path: String, method: String },

    #[error("Unknown HTTP method: {0}")]
    UnknownMethod(String),
}

/// Chat-completion transport and payload failures.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("No content in model response")]
    MissingContent,

    #[error("Failed to parse model response: {0}")]
    Parse(String),
}

/// Anything that aborts a query execution.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Please enter an input!")]
    EmptyQuery,

    #[error("Failed to bind parameters: {0}")]
    Binding(String),

    #[error("Missing required parameter: {name}")]
    MissingParameter { name: String },

    #[error("Unknown parameter for operation: {name}")]
    UnknownParameter { name: String },

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to reach FHIR server: {0}")]
    Request(String),

    #[error("FHIR server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Model returned an empty answer")]
    EmptyAnswer,

    #[error(transparent)]
    Model(#[from] LlmError),
}

/// Failure of the ADT conversion call.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error(transparent)]
    Model(#[from] LlmError),

    #[error("Model returned an empty reply")]
    EmptyReply,

    #[error("Failed to serialize raw response: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A session transition attempted without its precondition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("OpenAPI spec has not been loaded")]
    SpecNotLoaded,

    #[error("No operation selected")]
    NoOperationSelected,

    #[error("No search has been performed yet")]
    NoSearchPerformed,
}

/// Top-level error for the query pipeline
#[derive(Debug, Error)]
pub enum BreatherError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    SpecLoad(#[from] SpecLoadError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl BreatherError {
    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::SpecLoad(SpecLoadError::Parse(_)) => ErrorCategory::Serialization,
            Self::SpecLoad(_) => ErrorCategory::Network,
            Self::Selection(_) | Self::Session(_) => ErrorCategory::Validation,
            Self::Execution(ExecutionError::EmptyQuery)
            | Self::Execution(ExecutionError::MissingParameter { .. })
            | Self::Execution(ExecutionError::UnknownParameter { .. })
            | Self::Execution(ExecutionError::InvalidUrl(_)) => ErrorCategory::Validation,
            Self::Execution(ExecutionError::Binding(_))
            | Self::Execution(ExecutionError::EmptyAnswer) => ErrorCategory::Model,
            Self::Execution(ExecutionError::Model(_)) | Self::Conversion(_) => ErrorCategory::Model,
            Self::Execution(ExecutionError::Request(_))
            | Self::Execution(ExecutionError::Http { .. }) => ErrorCategory::Network,
        }
    }

    /// Whether the user can fix this by changing input rather than retrying
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Configuration | ErrorCategory::Validation
        )
    }
}

/// Error categories for logging and display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Validation,
    Network,
    Serialization,
    Model,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Validation => write!(f, "validation"),
            Self::Network => write!(f, "network"),
            Self::Serialization => write!(f, "serialization"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// Convenience result type for pipeline operations
pub type Result<T> = std::result::Result<T, BreatherError>;
