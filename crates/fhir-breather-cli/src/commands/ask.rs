use anyhow::{Context, Result};
use colored::Colorize;
use fhir_breather_core::{AdtOutcome, ConfigError, ExecutionMode};
use serde_json::{Map, Value, json};

use crate::cli::{AskArgs, OutputFormat};
use crate::config::Settings;
use crate::output::{print_error, print_value};

use super::{Pipeline, open_session};

pub async fn ask(settings: &Settings, args: &AskArgs) -> Result<()> {
    let query = args.query_text();
    let mut session = open_session(settings).await?;
    session.select_operation(&args.operation.path, args.operation.method)?;
    let pipeline = Pipeline::new(settings);

    if args.raw {
        if !settings.credentials.is_key_configured() {
            return Err(ConfigError::KeyNotConfigured.into());
        }
        let op = session.operation().context("No operation selected")?;
        let result = pipeline
            .executor
            .answer(&query, op, ExecutionMode::Raw)
            .await?;
        let raw = result.raw_response.context("Raw mode returned no response")?;
        print_value(&serde_json::to_value(&raw)?, settings.format);
        return Ok(());
    }

    let answer = session.search(&pipeline.executor, &query).await?;
    let adt = if args.convert {
        let outcome = session.convert(&pipeline.executor, &pipeline.converter).await?;
        Some(outcome)
    } else {
        None
    };

    match settings.format {
        OutputFormat::Json | OutputFormat::Yaml => {
            let mut out = Map::new();
            out.insert("query".into(), json!(query));
            out.insert("answer".into(), json!(answer));
            if let Some(outcome) = &adt {
                let key = if outcome.is_message() { "adt" } else { "adt_error" };
                out.insert(key.into(), json!(outcome.text()));
            }
            print_value(&Value::Object(out), settings.format);
        }
        OutputFormat::Table => {
            println!("{answer}");
            match adt {
                Some(AdtOutcome::Message(message)) => {
                    println!();
                    println!("{}", "ADT message".cyan().bold());
                    println!("{message}");
                }
                Some(AdtOutcome::Failed(reason)) => print_error(&reason),
                None => {}
            }
        }
    }
    Ok(())
}
