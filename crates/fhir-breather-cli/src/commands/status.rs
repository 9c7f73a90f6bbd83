use anyhow::Result;
use colored::Colorize;
use fhir_breather_core::config::mask_key;
use fhir_breather_core::list_paths;

use crate::config::Settings;
use crate::output::print_field;

use super::open_session;

pub async fn status(settings: &Settings) -> Result<()> {
    let credentials = &settings.credentials;
    println!("{}", credentials.status());

    let api_key = credentials.api_key().map(mask_key);
    let fhir_url = credentials.fhir_base_url();

    print_field("Profile", &settings.profile);
    print_field("API key", api_key.as_deref().unwrap_or("(not set)"));
    print_field("FHIR server", fhir_url.unwrap_or("(not set)"));
    print_field("Model", &settings.model);
    print_field("Discovery", &settings.discovery_url);

    if !credentials.is_configured() {
        return Ok(());
    }
    if !credentials.is_key_configured() {
        println!(
            "{} API key does not look like an OpenAI key (sk-...)",
            "!".yellow()
        );
    }

    match open_session(settings).await {
        Ok(session) => {
            let paths = session.spec().map(list_paths).unwrap_or_default();
            println!(
                "{} OpenAPI spec loaded: {} paths",
                "✓".green(),
                paths.len().to_string().cyan()
            );
        }
        Err(e) => {
            println!("{} OpenAPI spec unavailable: {e:#}", "✗".red());
        }
    }
    Ok(())
}
