//! Session credentials.
//!
//! Holds the two values a session needs before any pipeline stage runs: the
//! model provider API key and the FHIR server base URL. Nothing here is
//! persisted.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;

/// Prefix every OpenAI secret key carries. Not a live validation.
pub const API_KEY_PATTERN: &str = r"^sk-";

static API_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(API_KEY_PATTERN).expect("Invalid api key regex"));

/// Returns true if `key` looks like an OpenAI secret key.
pub fn validate_api_key(key: &str) -> bool {
    API_KEY_RE.is_match(key)
}

/// Credentials for one interactive session.
#[derive(Clone, Default)]
pub struct Credentials {
    api_key: Option<String>,
    fhir_base_url: Option<String>,
}

impl Credentials {
    pub fn new(api_key: Option<String>, fhir_base_url: Option<String>) -> Self {
        Self {
            api_key,
            fhir_base_url,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_fhir_base_url(mut self, url: impl Into<String>) -> Self {
        self.fhir_base_url = Some(url.into());
        self
    }

    /// The API key, if present and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// The FHIR base URL, if present and non-empty. No format checks.
    pub fn fhir_base_url(&self) -> Option<&str> {
        self.fhir_base_url.as_deref().filter(|u| !u.is_empty())
    }

    /// Both credentials present and non-empty.
    pub fn is_configured(&self) -> bool {
        self.api_key().is_some() && self.fhir_base_url().is_some()
    }

    /// API key present and shaped like an OpenAI key.
    pub fn is_key_configured(&self) -> bool {
        self.api_key().is_some_and(validate_api_key)
    }

    /// Gate for pipeline entry; names the first missing credential.
    pub fn require_configured(&self) -> Result<(), ConfigError> {
        if self.api_key().is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.fhir_base_url().is_none() {
            return Err(ConfigError::MissingFhirBaseUrl);
        }
        Ok(())
    }

    pub fn status(&self) -> ConfigStatus {
        ConfigStatus {
            api_key_added: self.api_key().is_some(),
            fhir_server_added: self.fhir_base_url().is_some(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key().map(mask_key))
            .field("fhir_base_url", &self.fhir_base_url)
            .finish()
    }
}

/// Presence report shown before the pipeline starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigStatus {
    pub api_key_added: bool,
    pub fhir_server_added: bool,
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "OpenAI API Key added: {}", self.api_key_added)?;
        write!(f, "FHIR Server details added: {}", self.fhir_server_added)
    }
}

/// Short preview of a key, safe for logs.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..5].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}
