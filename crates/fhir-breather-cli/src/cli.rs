use clap::{Parser, Subcommand, ValueEnum};
use fhir_breather_core::HttpMethod;

#[derive(Parser)]
#[command(name = "fhir-breather")]
#[command(about = "FHIR Breather: ask any FHIR server questions in plain language")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// OpenAI API key (overrides OPENAI_API_KEY env var; never stored)
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// FHIR server base URL (overrides config and FHIR_API_BASE_URL env var)
    #[arg(short = 's', long, global = true, env = "FHIR_API_BASE_URL")]
    pub fhir_url: Option<String>,

    /// Config profile name
    #[arg(short, long, global = true, env = "FHIR_BREATHER_PROFILE", default_value = "default")]
    pub profile: String,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Chat model used for binding, narration and ADT conversion
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, global = true, env = "OPENAI_API_BASE")]
    pub api_base: Option<String>,

    /// Where the OpenAPI document is fetched from
    #[arg(long, global = true)]
    pub discovery_url: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Clone, Copy, ValueEnum, Default, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show which credentials are configured and whether the spec loads
    Status,
    /// List the paths declared by the OpenAPI document
    Paths,
    /// List the HTTP methods available on a path
    Methods(MethodsArgs),
    /// Show the parameters and schemas of one operation
    Describe(OperationArgs),
    /// Ask one question against an operation
    Ask(AskArgs),
    /// Interactive session: pick an operation, then ask questions
    Chat,
    /// Manage CLI configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct MethodsArgs {
    /// Path as declared in the document (e.g. /Patient)
    pub path: String,
}

#[derive(clap::Args)]
pub struct OperationArgs {
    /// Path as declared in the document (e.g. /Patient)
    pub path: String,
    /// HTTP method (e.g. get)
    pub method: HttpMethod,
}

#[derive(clap::Args)]
pub struct AskArgs {
    #[command(flatten)]
    pub operation: OperationArgs,
    /// The question, e.g. "find patient John Smith"
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,
    /// Print the unmodified server response instead of a narrated answer
    #[arg(long, conflicts_with = "convert")]
    pub raw: bool,
    /// Also convert the result to an HL7 v2.x ADT message
    #[arg(long)]
    pub convert: bool,
}

impl AskArgs {
    pub fn query_text(&self) -> String {
        self.query.join(" ")
    }
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current config
    Show,
    /// Set config value
    Set(ConfigSetArgs),
}

#[derive(clap::Args)]
pub struct ConfigSetArgs {
    /// Key to set (fhir_url, model, discovery_url, format)
    pub key: String,
    /// Value
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ask_with_multi_word_query() {
        let cli = Cli::try_parse_from([
            "fhir-breather",
            "ask",
            "/Patient",
            "get",
            "find",
            "patient",
            "John",
            "Smith",
        ])
        .unwrap();
        let Commands::Ask(args) = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(args.operation.path, "/Patient");
        assert_eq!(args.operation.method, HttpMethod::Get);
        assert_eq!(args.query_text(), "find patient John Smith");
        assert!(!args.raw);
    }

    #[test]
    fn raw_and_convert_conflict() {
        let result = Cli::try_parse_from([
            "fhir-breather",
            "ask",
            "/Patient",
            "get",
            "q",
            "--raw",
            "--convert",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_unknown_method() {
        let result = Cli::try_parse_from(["fhir-breather", "describe", "/Patient", "fetch"]);
        assert!(result.is_err());
    }
}
