//! Natural-language querying of FHIR servers through their OpenAPI surface.
//!
//! Pipeline: [`config`] credentials gate everything; [`openapi`] discovers
//! and rebinds the spec; [`selector`] turns a path/method choice into an
//! [`OperationDescriptor`]; [`executor`] binds a question to it, calls the
//! server and narrates the result; [`adt`] reformats a raw result as an
//! HL7 v2.x ADT message. [`session`] ties the stages together for one user.

pub mod adt;
pub mod binding;
pub mod config;
pub mod error;
pub mod executor;
pub mod llm;
pub mod openapi;
pub mod selector;
pub mod session;

pub use adt::{AdtConverter, AdtOutcome};
pub use binding::{
    ModelNarrator, ModelParameterBinder, ParameterBinder, RequestArgs, ResponseNarrator,
};
pub use config::{ConfigStatus, Credentials, validate_api_key};
pub use error::{
    BreatherError, ConfigError, ConversionError, ErrorCategory, ExecutionError, LlmError, Result,
    SelectionError, SessionError, SpecLoadError,
};
pub use executor::{ExecutionMode, ExecutorOptions, QueryExecutor, QueryResult, RawResponse};
pub use llm::{ChatMessage, ChatModel, OpenAiChatModel};
pub use openapi::{DEFAULT_DISCOVERY_URL, HttpMethod, OpenApiSpec, SpecLoader};
pub use selector::{OperationDescriptor, list_methods, list_paths, resolve_operation};
pub use session::{Session, SessionFlags, SessionState};
