use anyhow::{Context, Result};
use fhir_breather_core::openapi::PathItem;
use fhir_breather_core::{HttpMethod, list_methods, list_paths, resolve_operation};
use serde_json::{Value, json};

use crate::cli::OutputFormat;
use crate::config::Settings;
use crate::output::{print_field, print_value, render_table};

use super::open_session;

pub async fn paths(settings: &Settings) -> Result<()> {
    let session = open_session(settings).await?;
    let spec = session.spec().context("OpenAPI spec not loaded")?;

    let rows: Vec<Value> = list_paths(spec)
        .into_iter()
        .map(|path| {
            let methods: Vec<&str> = spec
                .path_item(&path)
                .map(|item| item.operations.keys().map(HttpMethod::as_str).collect())
                .unwrap_or_default();
            json!({ "path": path, "methods": methods })
        })
        .collect();
    print_value(&Value::Array(rows), settings.format);
    Ok(())
}

pub async fn methods(settings: &Settings, path: &str) -> Result<()> {
    let session = open_session(settings).await?;
    let spec = session.spec().context("OpenAPI spec not loaded")?;

    let methods = list_methods(spec, path)?;
    let item = spec.path_item(path);
    let rows: Vec<Value> = methods
        .into_iter()
        .map(|method| method_row(item, method))
        .collect();
    print_value(&Value::Array(rows), settings.format);
    Ok(())
}

fn method_row(item: Option<&PathItem>, method: HttpMethod) -> Value {
    let op = item.and_then(|i| i.operations.get(&method));
    json!({
        "method": method.as_str(),
        "summary": op.and_then(|o| o.summary.as_deref()),
        "operation_id": op.and_then(|o| o.operation_id.as_deref()),
    })
}

pub async fn describe(settings: &Settings, path: &str, method: HttpMethod) -> Result<()> {
    let session = open_session(settings).await?;
    let spec = session.spec().context("OpenAPI spec not loaded")?;
    let op = resolve_operation(spec, path, method)?;

    if matches!(settings.format, OutputFormat::Table) {
        print_field("Operation", &op.label());
        if let Some(summary) = &op.summary {
            print_field("Summary", summary);
        }
        if let Some(id) = &op.operation_id {
            print_field("Operation ID", id);
        }
        print_field("Request body", if op.accepts_body() { "yes" } else { "no" });
        let params: Vec<Value> = op
            .parameters
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "in": p.location.to_string(),
                    "required": p.required,
                    "description": p.description,
                })
            })
            .collect();
        println!("{}", render_table(&Value::Array(params)));
    } else {
        print_value(&serde_json::to_value(&op)?, settings.format);
    }
    Ok(())
}
