//! OpenAPI document model and discovery loader.
//!
//! The document is always fetched from a discovery endpoint (by default the
//! public HAPI R4 reference server) and then rebound to the FHIR server the
//! user configured. Paths, methods and schemas therefore describe the
//! reference server, while requests go to the user's server. This asymmetry
//! is kept on purpose: a target server that lacks an operation the reference
//! server declares will fail at execution time, not at selection time.
//!
//! Path and method order follows the document's declaration order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{SelectionError, SpecLoadError};

/// Discovery endpoint of the public HAPI FHIR R4 server.
pub const DEFAULT_DISCOVERY_URL: &str = "https://hapi.fhir.org/baseR4/api-docs";

/// HTTP methods an OpenAPI path item may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 8] = [
        Self::Get,
        Self::Put,
        Self::Post,
        Self::Delete,
        Self::Options,
        Self::Head,
        Self::Patch,
        Self::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
            Self::Patch => "PATCH",
            Self::Trace => "TRACE",
        }
    }

    /// Map a path-item key (`get`, `post`, ...) to a method.
    /// Non-method keys such as `parameters` or `summary` yield `None`.
    pub fn from_path_item_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(key))
    }

    /// Whether requests with this method carry a JSON body.
    pub fn has_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Put => reqwest::Method::PUT,
            Self::Post => reqwest::Method::POST,
            Self::Delete => reqwest::Method::DELETE,
            Self::Options => reqwest::Method::OPTIONS,
            Self::Head => reqwest::Method::HEAD,
            Self::Patch => reqwest::Method::PATCH,
            Self::Trace => reqwest::Method::TRACE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_path_item_key(s.trim())
            .ok_or_else(|| SelectionError::UnknownMethod(s.to_string()))
    }
}

/// Where a parameter is carried in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        };
        f.write_str(s)
    }
}

/// A parameter object as declared in the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// Either an inline parameter or a local `$ref` to `#/components/parameters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterOrRef {
    Ref {
        #[serde(rename = "$ref")]
        reference: String,
    },
    Item(Parameter),
}

/// An operation object under a path item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterOrRef>,
    #[serde(default)]
    pub request_body: Option<Value>,
    #[serde(default)]
    pub responses: IndexMap<String, Value>,
}

/// Operations and shared parameters declared for one path.
#[derive(Debug, Clone, Default)]
pub struct PathItem {
    pub operations: IndexMap<HttpMethod, Operation>,
    pub parameters: Vec<ParameterOrRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Components {
    #[serde(default)]
    pub parameters: IndexMap<String, Parameter>,
    #[serde(default)]
    pub schemas: IndexMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawServer {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    openapi: Option<String>,
    #[serde(default)]
    info: RawInfo,
    #[serde(default)]
    servers: Vec<RawServer>,
    #[serde(default)]
    paths: IndexMap<String, IndexMap<String, Value>>,
    #[serde(default)]
    components: Components,
}

/// A parsed OpenAPI document with a rebindable base URL.
#[derive(Debug, Clone)]
pub struct OpenApiSpec {
    pub openapi_version: Option<String>,
    pub title: Option<String>,
    pub version: Option<String>,
    servers: Vec<String>,
    paths: IndexMap<String, PathItem>,
    components: Components,
    base_url: Option<String>,
}

impl OpenApiSpec {
    /// Parse a JSON OpenAPI document. Declaration order of paths and methods is kept.
    pub fn from_json_str(text: &str) -> Result<Self, SpecLoadError> {
        let raw: RawDocument =
            serde_json::from_str(text).map_err(|e| SpecLoadError::Parse(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Parse an already decoded document. Paths come out in the map order of
    /// `value`; use [`Self::from_json_str`] when declaration order matters.
    pub fn from_value(value: Value) -> Result<Self, SpecLoadError> {
        let raw: RawDocument =
            serde_json::from_value(value).map_err(|e| SpecLoadError::Parse(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawDocument) -> Result<Self, SpecLoadError> {
        let mut paths = IndexMap::with_capacity(raw.paths.len());

        for (path, entries) in raw.paths {
            let mut item = PathItem::default();
            for (key, value) in entries {
                if key == "parameters" {
                    item.parameters = serde_json::from_value(value).map_err(|e| {
                        SpecLoadError::Parse(format!("{path}: invalid path parameters: {e}"))
                    })?;
                    continue;
                }
                let Some(method) = HttpMethod::from_path_item_key(&key) else {
                    continue;
                };
                let operation: Operation = serde_json::from_value(value).map_err(|e| {
                    SpecLoadError::Parse(format!("{method} {path}: invalid operation: {e}"))
                })?;
                item.operations.insert(method, operation);
            }
            paths.insert(path, item);
        }

        Ok(Self {
            openapi_version: raw.openapi,
            title: raw.info.title,
            version: raw.info.version,
            servers: raw.servers.into_iter().map(|s| s.url).collect(),
            paths,
            components: raw.components,
            base_url: None,
        })
    }

    /// Base URL requests resolve against: the override if set, else the first declared server.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .or_else(|| self.servers.first().map(String::as_str))
    }

    /// Point every operation at a different server. Paths and schemas are untouched.
    pub fn set_base_url(&mut self, url: impl Into<String>) {
        self.base_url = Some(url.into());
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn path_items(&self) -> impl Iterator<Item = (&str, &PathItem)> {
        self.paths.iter().map(|(p, item)| (p.as_str(), item))
    }

    pub fn path_item(&self, path: &str) -> Option<&PathItem> {
        self.paths.get(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Resolve an inline parameter or a `#/components/parameters/<name>` reference.
    pub fn resolve_parameter<'a>(&'a self, param: &'a ParameterOrRef) -> Option<&'a Parameter> {
        match param {
            ParameterOrRef::Item(p) => Some(p),
            ParameterOrRef::Ref { reference } => reference
                .strip_prefix("#/components/parameters/")
                .and_then(|name| self.components.parameters.get(name)),
        }
    }

    /// Replace a top-level `#/components/schemas/<name>` reference with its target.
    pub fn resolve_schema(&self, schema: &Value) -> Value {
        schema
            .get("$ref")
            .and_then(Value::as_str)
            .and_then(|r| r.strip_prefix("#/components/schemas/"))
            .and_then(|name| self.components.schemas.get(name))
            .cloned()
            .unwrap_or_else(|| schema.clone())
    }
}

/// Fetches the OpenAPI document from the discovery endpoint.
pub struct SpecLoader {
    http: reqwest::Client,
    discovery_url: String,
    cache: Option<RwLock<HashMap<String, Arc<OpenApiSpec>>>>,
}

impl Default for SpecLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecLoader {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            discovery_url: DEFAULT_DISCOVERY_URL.to_string(),
            cache: None,
        }
    }

    #[must_use]
    pub fn with_discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_url = url.into();
        self
    }

    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Keep fetched documents in memory, keyed by discovery URL.
    #[must_use]
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(RwLock::new(HashMap::new()));
        self
    }

    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    /// Fetch, parse, then rebind the document to `fhir_base_url`.
    pub async fn load(&self, fhir_base_url: &str) -> Result<OpenApiSpec, SpecLoadError> {
        let unbound = self.fetch_shared().await?;
        let mut spec = OpenApiSpec::clone(&unbound);
        spec.set_base_url(fhir_base_url);
        debug!(base_url = fhir_base_url, "Rebound OpenAPI spec base URL");
        Ok(spec)
    }

    async fn fetch_shared(&self) -> Result<Arc<OpenApiSpec>, SpecLoadError> {
        let Some(cache) = &self.cache else {
            return self.fetch().await.map(Arc::new);
        };

        if let Some(spec) = cache.read().await.get(&self.discovery_url) {
            debug!(url = %self.discovery_url, "OpenAPI spec cache hit");
            return Ok(Arc::clone(spec));
        }

        let spec = Arc::new(self.fetch().await?);
        cache
            .write()
            .await
            .insert(self.discovery_url.clone(), Arc::clone(&spec));
        Ok(spec)
    }

    async fn fetch(&self) -> Result<OpenApiSpec, SpecLoadError> {
        info!(url = %self.discovery_url, "Fetching OpenAPI spec");
        let resp = self
            .http
            .get(&self.discovery_url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SpecLoadError::Request {
                url: self.discovery_url.clone(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SpecLoadError::Http {
                url: self.discovery_url.clone(),
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(|e| SpecLoadError::Request {
            url: self.discovery_url.clone(),
            message: e.to_string(),
        })?;
        let spec = OpenApiSpec::from_json_str(&body)?;
        info!(paths = spec.len(), "Loaded OpenAPI spec");
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r##"{
        "openapi": "3.0.1",
        "info": {"title": "HAPI FHIR Server", "version": "7.0.0"},
        "servers": [{"url": "https://hapi.fhir.org/baseR4"}],
        "paths": {
            "/Patient/{id}": {
                "parameters": [{"$ref": "#/components/parameters/id"}],
                "get": {"operationId": "read-patient", "summary": "Read Patient"},
                "delete": {"operationId": "delete-patient"}
            },
            "/Patient": {
                "summary": "Patient resource",
                "post": {"operationId": "create-patient"},
                "get": {
                    "operationId": "search-patient",
                    "parameters": [
                        {"name": "name", "in": "query", "schema": {"type": "string"}}
                    ]
                }
            },
            "/metadata": {"get": {}}
        },
        "components": {
            "parameters": {
                "id": {"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}
            },
            "schemas": {
                "Bundle": {"type": "object"}
            }
        }
    }"##;

    #[test]
    fn parses_paths_in_declaration_order() {
        let spec = OpenApiSpec::from_json_str(DOC).unwrap();
        let paths: Vec<&str> = spec.path_items().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["/Patient/{id}", "/Patient", "/metadata"]);
        assert_eq!(spec.title.as_deref(), Some("HAPI FHIR Server"));
        assert_eq!(spec.openapi_version.as_deref(), Some("3.0.1"));
    }

    #[test]
    fn non_method_keys_are_not_operations() {
        let spec = OpenApiSpec::from_json_str(DOC).unwrap();
        let item = spec.path_item("/Patient").unwrap();
        let methods: Vec<HttpMethod> = item.operations.keys().copied().collect();
        assert_eq!(methods, vec![HttpMethod::Post, HttpMethod::Get]);

        let item = spec.path_item("/Patient/{id}").unwrap();
        assert_eq!(item.parameters.len(), 1);
        assert_eq!(item.operations.len(), 2);
    }

    #[test]
    fn base_url_override_wins_over_servers() {
        let mut spec = OpenApiSpec::from_json_str(DOC).unwrap();
        assert_eq!(spec.base_url(), Some("https://hapi.fhir.org/baseR4"));
        spec.set_base_url("http://localhost:8080/fhir");
        assert_eq!(spec.base_url(), Some("http://localhost:8080/fhir"));
        assert_eq!(spec.servers(), ["https://hapi.fhir.org/baseR4".to_string()]);
    }

    #[test]
    fn resolves_component_refs() {
        let spec = OpenApiSpec::from_json_str(DOC).unwrap();
        let item = spec.path_item("/Patient/{id}").unwrap();
        let param = spec.resolve_parameter(&item.parameters[0]).unwrap();
        assert_eq!(param.name, "id");
        assert_eq!(param.location, ParameterLocation::Path);
        assert!(param.required);

        let schema =
            spec.resolve_schema(&serde_json::json!({"$ref": "#/components/schemas/Bundle"}));
        assert_eq!(schema, serde_json::json!({"type": "object"}));

        let missing = ParameterOrRef::Ref {
            reference: "#/components/parameters/nope".into(),
        };
        assert!(spec.resolve_parameter(&missing).is_none());
    }

    #[test]
    fn parses_decoded_documents() {
        let value = serde_json::json!({
            "paths": {"/Patient": {"get": {"operationId": "search-patient"}}}
        });
        let spec = OpenApiSpec::from_value(value).unwrap();
        assert_eq!(spec.len(), 1);
        assert!(spec.base_url().is_none());

        let err = OpenApiSpec::from_value(serde_json::json!({"paths": []})).unwrap_err();
        assert!(matches!(err, SpecLoadError::Parse(_)));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = OpenApiSpec::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, SpecLoadError::Parse(_)));
    }

    #[test]
    fn malformed_operation_is_a_parse_error() {
        let doc = r#"{"paths": {"/Patient": {"get": {"parameters": "oops"}}}}"#;
        let err = OpenApiSpec::from_json_str(doc).unwrap_err();
        assert!(err.to_string().contains("GET /Patient"));
    }

    #[test]
    fn http_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("Post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!(
            "FETCH".parse::<HttpMethod>().unwrap_err(),
            SelectionError::UnknownMethod("FETCH".into())
        );
        assert!(HttpMethod::from_path_item_key("parameters").is_none());
        assert!(HttpMethod::Put.has_body());
        assert!(!HttpMethod::Get.has_body());
    }
}
