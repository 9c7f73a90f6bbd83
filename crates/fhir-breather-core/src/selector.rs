//! Path/method selection and operation materialization.

use serde::Serialize;
use serde_json::Value;

use crate::error::SelectionError;
use crate::openapi::{HttpMethod, OpenApiSpec, Operation, ParameterLocation};

/// A fully resolved parameter of an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationParameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// Everything needed to execute one API operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationDescriptor {
    pub path: String,
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    pub base_url: Option<String>,
    pub parameters: Vec<OperationParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
}

impl OperationDescriptor {
    pub fn parameter(
        &self,
        name: &str,
        location: ParameterLocation,
    ) -> Option<&OperationParameter> {
        self.parameters
            .iter()
            .find(|p| p.name == name && p.location == location)
    }

    pub fn parameters_in(
        &self,
        location: ParameterLocation,
    ) -> impl Iterator<Item = &OperationParameter> {
        self.parameters.iter().filter(move |p| p.location == location)
    }

    pub fn accepts_body(&self) -> bool {
        self.request_body_schema.is_some() || self.method.has_body()
    }

    /// Short label such as `GET /Patient`.
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Declared paths, in document order.
pub fn list_paths(spec: &OpenApiSpec) -> Vec<String> {
    spec.path_items().map(|(path, _)| path.to_string()).collect()
}

/// Methods declared for `path`, in document order.
pub fn list_methods(spec: &OpenApiSpec, path: &str) -> Result<Vec<HttpMethod>, SelectionError> {
    let item = spec
        .path_item(path)
        .ok_or_else(|| SelectionError::UnknownPath(path.to_string()))?;
    Ok(item.operations.keys().copied().collect())
}

/// Materialize `(path, method)` into an executable descriptor.
pub fn resolve_operation(
    spec: &OpenApiSpec,
    path: &str,
    method: HttpMethod,
) -> Result<OperationDescriptor, SelectionError> {
    let item = spec
        .path_item(path)
        .ok_or_else(|| SelectionError::UnknownPath(path.to_string()))?;
    let operation = item
        .operations
        .get(&method)
        .ok_or_else(|| SelectionError::UnsupportedMethod {
            path: path.to_string(),
            method: method.to_string(),
        })?;

    // Operation-level parameters override path-level ones with the same name and location.
    let mut parameters: Vec<OperationParameter> = Vec::new();
    for param in item.parameters.iter().chain(operation.parameters.iter()) {
        let Some(param) = spec.resolve_parameter(param) else {
            tracing::warn!(path, %method, "Skipping unresolvable parameter reference");
            continue;
        };
        let resolved = OperationParameter {
            name: param.name.clone(),
            location: param.location,
            required: param.required || param.location == ParameterLocation::Path,
            description: param.description.clone(),
            schema: param.schema.as_ref().map(|s| spec.resolve_schema(s)),
        };
        match parameters
            .iter_mut()
            .find(|p| p.name == resolved.name && p.location == resolved.location)
        {
            Some(existing) => *existing = resolved,
            None => parameters.push(resolved),
        }
    }

    Ok(OperationDescriptor {
        path: path.to_string(),
        method,
        operation_id: operation.operation_id.clone(),
        summary: operation.summary.clone(),
        description: operation.description.clone(),
        base_url: spec.base_url().map(str::to_string),
        parameters,
        request_body_schema: request_body_schema(spec, operation),
        response_schema: response_schema(spec, operation),
    })
}

fn request_body_schema(spec: &OpenApiSpec, operation: &Operation) -> Option<Value> {
    let body = operation.request_body.as_ref()?;
    let body = spec.resolve_schema(body);
    content_schema(spec, body.get("content")?)
}

fn response_schema(spec: &OpenApiSpec, operation: &Operation) -> Option<Value> {
    let response = operation
        .responses
        .get("200")
        .or_else(|| {
            operation
                .responses
                .iter()
                .find(|(code, _)| code.starts_with('2'))
                .map(|(_, r)| r)
        })
        .or_else(|| operation.responses.get("default"))?;
    content_schema(spec, response.get("content")?)
}

/// Pick the FHIR JSON media type if declared, else the first one.
fn content_schema(spec: &OpenApiSpec, content: &Value) -> Option<Value> {
    let content = content.as_object()?;
    let media = content
        .get("application/fhir+json")
        .or_else(|| content.get("application/json"))
        .or_else(|| content.values().next())?;
    media.get("schema").map(|s| spec.resolve_schema(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r##"{
        "servers": [{"url": "https://hapi.fhir.org/baseR4"}],
        "paths": {
            "/Patient": {
                "get": {
                    "operationId": "search-type-Patient",
                    "summary": "Search for Patient instances",
                    "parameters": [
                        {"name": "name", "in": "query", "schema": {"type": "string"}},
                        {"name": "birthdate", "in": "query", "description": "Date of birth"}
                    ],
                    "responses": {
                        "200": {
                            "description": "Success",
                            "content": {
                                "application/fhir+json": {"schema": {"$ref": "#/components/schemas/Bundle"}},
                                "application/fhir+xml": {"schema": {"type": "string"}}
                            }
                        }
                    }
                }
            },
            "/Patient/{id}": {
                "parameters": [
                    {"name": "id", "in": "path", "description": "shared"},
                    {"name": "_pretty", "in": "query"}
                ],
                "get": {
                    "parameters": [{"name": "id", "in": "path", "required": true, "description": "override"}]
                },
                "put": {
                    "requestBody": {
                        "content": {"application/json": {"schema": {"type": "object", "title": "Patient"}}}
                    },
                    "responses": {
                        "201": {"content": {"application/json": {"schema": {"type": "object"}}}}
                    }
                }
            }
        },
        "components": {"schemas": {"Bundle": {"type": "object", "title": "Bundle"}}}
    }"##;

    fn spec() -> OpenApiSpec {
        OpenApiSpec::from_json_str(DOC).unwrap()
    }

    #[test]
    fn single_patient_get_spec() {
        let spec = OpenApiSpec::from_json_str(r#"{"paths": {"/Patient": {"get": {}}}}"#).unwrap();
        assert_eq!(list_paths(&spec), vec!["/Patient".to_string()]);
        assert_eq!(
            list_methods(&spec, "/Patient").unwrap(),
            vec![HttpMethod::Get]
        );
    }

    #[test]
    fn list_methods_unknown_path() {
        assert_eq!(
            list_methods(&spec(), "/Observation").unwrap_err(),
            SelectionError::UnknownPath("/Observation".into())
        );
    }

    #[test]
    fn every_declared_pair_resolves() {
        let spec = spec();
        for path in list_paths(&spec) {
            for method in list_methods(&spec, &path).unwrap() {
                let op = resolve_operation(&spec, &path, method).unwrap();
                assert_eq!(op.path, path);
                assert_eq!(op.method, method);
            }
        }
    }

    #[test]
    fn undeclared_pairs_fail() {
        let spec = spec();
        for path in list_paths(&spec) {
            let declared = list_methods(&spec, &path).unwrap();
            for method in HttpMethod::ALL.into_iter().filter(|m| !declared.contains(m)) {
                let err = resolve_operation(&spec, &path, method).unwrap_err();
                assert!(matches!(err, SelectionError::UnsupportedMethod { .. }));
            }
        }
        let err = resolve_operation(&spec, "/Encounter", HttpMethod::Get).unwrap_err();
        assert_eq!(err, SelectionError::UnknownPath("/Encounter".into()));
    }

    #[test]
    fn descriptor_carries_schemas_and_parameters() {
        let op = resolve_operation(&spec(), "/Patient", HttpMethod::Get).unwrap();
        assert_eq!(op.operation_id.as_deref(), Some("search-type-Patient"));
        assert_eq!(op.base_url.as_deref(), Some("https://hapi.fhir.org/baseR4"));
        assert_eq!(op.parameters.len(), 2);
        assert!(op.parameter("name", ParameterLocation::Query).is_some());
        assert_eq!(
            op.response_schema,
            Some(serde_json::json!({"type": "object", "title": "Bundle"}))
        );
        assert!(op.request_body_schema.is_none());
        assert!(!op.accepts_body());
        assert_eq!(op.label(), "GET /Patient");
    }

    #[test]
    fn operation_parameters_override_path_parameters() {
        let op = resolve_operation(&spec(), "/Patient/{id}", HttpMethod::Get).unwrap();
        assert_eq!(op.parameters.len(), 2);
        let id = op.parameter("id", ParameterLocation::Path).unwrap();
        assert_eq!(id.description.as_deref(), Some("override"));
        assert!(id.required);
    }

    #[test]
    fn path_parameters_are_always_required() {
        let op = resolve_operation(&spec(), "/Patient/{id}", HttpMethod::Put).unwrap();
        let id = op.parameter("id", ParameterLocation::Path).unwrap();
        assert!(id.required);
        assert_eq!(
            op.request_body_schema,
            Some(serde_json::json!({"type": "object", "title": "Patient"}))
        );
        assert_eq!(
            op.response_schema,
            Some(serde_json::json!({"type": "object"}))
        );
        assert_eq!(op.parameters_in(ParameterLocation::Query).count(), 1);
    }

    #[test]
    fn rebound_base_url_flows_into_descriptor() {
        let mut spec = spec();
        spec.set_base_url("http://localhost:8080/fhir");
        let op = resolve_operation(&spec, "/Patient", HttpMethod::Get).unwrap();
        assert_eq!(op.base_url.as_deref(), Some("http://localhost:8080/fhir"));
    }
}
