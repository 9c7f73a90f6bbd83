use anyhow::Result;

use crate::cli::ConfigSetArgs;
use crate::config::{self, CONFIG_KEYS};
use crate::output::{print_field, print_success};

pub fn show(profile: &str) -> Result<()> {
    let cfg = config::load_profile(profile)?;
    print_field("Profile", profile);
    let values = [&cfg.fhir_url, &cfg.model, &cfg.discovery_url, &cfg.format];
    for (key, value) in CONFIG_KEYS.iter().zip(values) {
        print_field(key, value.as_deref().unwrap_or("(not set)"));
    }
    Ok(())
}

pub fn set(profile: &str, args: &ConfigSetArgs) -> Result<()> {
    let mut cfg = config::load_profile(profile)?;
    cfg.set(&args.key, &args.value)?;
    config::save_profile(profile, &cfg)?;
    print_success(&format!("Set {} = {}", args.key, args.value));
    Ok(())
}
