use std::fmt::Display;

use anyhow::{Context, Result};
use colored::Colorize;
use fhir_breather_core::{AdtOutcome, HttpMethod, Session, list_methods, list_paths};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use crate::config::Settings;
use crate::observability::apply_logging_level;
use crate::output::{print_error, print_success};

use super::{Pipeline, open_session};

const HELP: &str = "\
Type a question to query the selected operation.
  :convert       convert the last answer to an HL7 v2.x ADT message
  :select        choose another path and method
  :log <level>   change the log level (e.g. debug, info, warn)
  :help          show this help
  :quit          leave the session";

type Input = Lines<BufReader<Stdin>>;

pub async fn chat(settings: &Settings) -> Result<()> {
    println!("{}", settings.credentials.status());
    let mut session = open_session(settings).await?;
    let pipeline = Pipeline::new(settings);
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    if !select_operation(&mut session, &mut input).await? {
        return Ok(());
    }
    println!("{HELP}");

    loop {
        let Some(line) = prompt(&mut input, "query").await? else {
            break;
        };
        let line = line.trim();
        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
            (":quit" | ":q" | ":exit", _) => break,
            (":help", _) => println!("{HELP}"),
            (":select", _) => {
                if !select_operation(&mut session, &mut input).await? {
                    break;
                }
            }
            (":log", level) if !level.is_empty() => {
                if apply_logging_level(level) {
                    print_success(&format!("Log level set to {level}"));
                } else {
                    print_error("Logging is not initialised");
                }
            }
            (":convert", _) => {
                match session.convert(&pipeline.executor, &pipeline.converter).await {
                    Ok(AdtOutcome::Message(message)) => {
                        println!("{}", "ADT message".cyan().bold());
                        println!("{message}");
                    }
                    Ok(AdtOutcome::Failed(reason)) => print_error(&reason),
                    Err(e) => print_error(&e.to_string()),
                }
            }
            (command, _) if command.starts_with(':') => {
                print_error(&format!("Unknown command {command}. Type :help"));
            }
            _ => {
                session.clear_submit();
                match session.search(&pipeline.executor, line).await {
                    Ok(answer) => println!("{answer}"),
                    Err(e) => print_error(&e.to_string()),
                }
            }
        }
    }
    Ok(())
}

/// Walk the user through path then method. Returns false on end of input.
async fn select_operation(session: &mut Session, input: &mut Input) -> Result<bool> {
    let spec = session.spec().context("OpenAPI spec not loaded")?;
    let paths = list_paths(spec);

    let path = loop {
        print_options("Paths", &paths);
        let Some(answer) = prompt(input, "path").await? else {
            return Ok(false);
        };
        match pick(&answer, &paths) {
            Some(path) => break path.clone(),
            None => print_error(&format!("No such path: {}", answer.trim())),
        }
    };

    let methods = list_methods(spec, &path)?;
    let method: HttpMethod = loop {
        print_options("Methods", &methods);
        let Some(answer) = prompt(input, "method").await? else {
            return Ok(false);
        };
        match pick(&answer, &methods) {
            Some(method) => break *method,
            None => print_error(&format!("{} is not available on {path}", answer.trim())),
        }
    };

    let op = session.select_operation(&path, method)?;
    print_success(&format!("Selected {}", op.label()));
    Ok(true)
}

fn print_options<T: Display>(title: &str, options: &[T]) {
    println!("{}", title.cyan());
    for (i, option) in options.iter().enumerate() {
        println!("  {:>3}  {option}", i + 1);
    }
}

async fn prompt(input: &mut Input, label: &str) -> Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{label}> ").as_bytes()).await?;
    stdout.flush().await?;
    Ok(input.next_line().await?)
}

/// Match an answer by 1-based index or by case-insensitive text.
fn pick<'a, T: Display>(answer: &str, options: &'a [T]) -> Option<&'a T> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }
    if let Ok(index) = answer.parse::<usize>() {
        return index.checked_sub(1).and_then(|i| options.get(i));
    }
    options
        .iter()
        .find(|option| option.to_string().eq_ignore_ascii_case(answer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_by_index_or_name() {
        let paths = vec!["/metadata".to_string(), "/Patient".to_string()];
        assert_eq!(pick("2", &paths), Some(&paths[1]));
        assert_eq!(pick(" /patient ", &paths), Some(&paths[1]));
        assert_eq!(pick("0", &paths), None);
        assert_eq!(pick("3", &paths), None);
        assert_eq!(pick("", &paths), None);
    }

    #[test]
    fn picks_methods_by_name() {
        let methods = vec![HttpMethod::Get, HttpMethod::Post];
        assert_eq!(pick("post", &methods), Some(&HttpMethod::Post));
        assert_eq!(pick("DELETE", &methods), None);
    }
}
