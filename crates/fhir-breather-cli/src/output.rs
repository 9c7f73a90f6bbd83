use crate::cli::OutputFormat;
use colored::Colorize;
use fhir_breather_core::{BreatherError, ErrorCategory};
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", to_pretty_json(value)),
        OutputFormat::Yaml => print!("{}", to_yaml(value)),
        OutputFormat::Table => println!("{}", render_table(value)),
    }
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a failed command, logging how the error is classified.
pub fn report_error(err: &anyhow::Error) {
    if let Some((category, user_error)) = classify(err) {
        tracing::debug!(%category, user_error, "Command failed");
    }
    print_error(&format!("{err:#}"));
}

fn classify(err: &anyhow::Error) -> Option<(ErrorCategory, bool)> {
    err.downcast_ref::<BreatherError>()
        .map(|e| (e.category(), e.is_user_error()))
}

pub fn print_field(label: &str, value: &str) {
    println!("{}: {}", label.cyan(), value);
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn to_yaml(value: &Value) -> String {
    serde_yaml::to_string(value).unwrap_or_else(|_| to_pretty_json(value))
}

/// Arrays of objects become one row per element; an object becomes a
/// key/value table. Anything else falls back to JSON.
pub fn render_table(value: &Value) -> String {
    match value {
        Value::Array(rows) if rows.is_empty() => "No results.".to_string(),
        Value::Array(rows) if rows.iter().all(Value::is_object) => {
            let mut columns: Vec<&str> = Vec::new();
            for row in rows.iter().filter_map(Value::as_object) {
                for key in row.keys() {
                    if !columns.contains(&key.as_str()) {
                        columns.push(key);
                    }
                }
            }
            let mut builder = Builder::default();
            builder.push_record(columns.iter().map(|c| header(c)));
            for row in rows {
                builder.push_record(columns.iter().map(|c| cell(row.get(*c))));
            }
            builder.build().with(Style::rounded()).to_string()
        }
        Value::Object(obj) => {
            let mut builder = Builder::default();
            builder.push_record(["Field", "Value"]);
            for (k, v) in obj {
                builder.push_record([k.clone(), cell(Some(v))]);
            }
            builder.build().with(Style::rounded()).to_string()
        }
        other => to_pretty_json(other),
    }
}

fn header(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>().replace('_', " "),
        None => String::new(),
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhir_breather_core::{ConfigError, ExecutionError};
    use serde_json::json;

    #[test]
    fn table_collects_columns_across_rows() {
        let table = render_table(&json!([
            {"path": "/Patient", "methods": ["GET", "POST"]},
            {"path": "/metadata", "summary": "server-capabilities"}
        ]));
        assert!(table.contains("Path"));
        assert!(table.contains("Methods"));
        assert!(table.contains("Summary"));
        assert!(table.contains("GET, POST"));
        assert!(table.contains("server-capabilities"));
    }

    #[test]
    fn empty_array_has_placeholder() {
        assert_eq!(render_table(&json!([])), "No results.");
    }

    #[test]
    fn scalar_falls_back_to_json() {
        assert_eq!(render_table(&json!("answer")), "\"answer\"");
    }

    #[test]
    fn yaml_escapes_quotes_and_backslashes() {
        let value = json!({
            "answer": "He said \"no\"",
            "path": "C:\\fhir\\Patient",
            "adt": "MSH|^~\\&|a\nPID|b",
            "count": 1
        });
        let yaml = to_yaml(&value);
        let parsed: Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn classifies_core_errors_through_context() {
        let err = anyhow::Error::from(BreatherError::from(ConfigError::KeyNotConfigured))
            .context("Search failed");
        assert_eq!(classify(&err), Some((ErrorCategory::Configuration, true)));

        let err = anyhow::Error::from(BreatherError::from(ExecutionError::EmptyAnswer));
        assert_eq!(classify(&err), Some((ErrorCategory::Model, false)));

        assert_eq!(classify(&anyhow::anyhow!("Unknown format: xml")), None);
    }

    #[test]
    fn header_is_title_cased() {
        assert_eq!(header("operation_id"), "Operation id");
        assert_eq!(header(""), "");
    }
}
