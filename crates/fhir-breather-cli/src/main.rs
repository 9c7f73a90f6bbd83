mod cli;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands, ConfigCommands};
use config::Settings;
use output::report_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        report_error(&e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // .env must be loaded before clap reads OPENAI_API_KEY / FHIR_API_BASE_URL.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    observability::init_tracing_with_level(&cli.log_level);
    let profile = &cli.profile;

    let settings = || Settings::load(&cli);

    match &cli.command {
        Commands::Config(args) => match &args.command {
            ConfigCommands::Show => commands::config::show(profile)?,
            ConfigCommands::Set(set_args) => commands::config::set(profile, set_args)?,
        },
        Commands::Status => commands::status::status(&settings()?).await?,
        Commands::Paths => commands::inspect::paths(&settings()?).await?,
        Commands::Methods(args) => commands::inspect::methods(&settings()?, &args.path).await?,
        Commands::Describe(args) => {
            commands::inspect::describe(&settings()?, &args.path, args.method).await?;
        }
        Commands::Ask(args) => commands::ask::ask(&settings()?, args).await?,
        Commands::Chat => commands::chat::chat(&settings()?).await?,
    }

    Ok(())
}
