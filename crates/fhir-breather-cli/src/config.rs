use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use fhir_breather_core::llm::{DEFAULT_API_BASE, DEFAULT_MODEL};
use fhir_breather_core::{Credentials, DEFAULT_DISCOVERY_URL};
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, OutputFormat};

pub const CONFIG_KEYS: [&str; 4] = ["fhir_url", "model", "discovery_url", "format"];

/// Per-profile preferences. Secrets are never stored here.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProfileConfig {
    pub fhir_url: Option<String>,
    pub model: Option<String>,
    pub discovery_url: Option<String>,
    pub format: Option<String>,
}

impl ProfileConfig {
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let slot = match key {
            "fhir_url" => &mut self.fhir_url,
            "model" => &mut self.model,
            "discovery_url" => &mut self.discovery_url,
            "format" => {
                parse_format(value)?;
                &mut self.format
            }
            "api_key" => anyhow::bail!(
                "The API key is not stored in profiles. Use --api-key or set OPENAI_API_KEY"
            ),
            other => anyhow::bail!(
                "Unknown config key: {other}. Valid keys: {}",
                CONFIG_KEYS.join(", ")
            ),
        };
        *slot = Some(value.to_string());
        Ok(())
    }
}

pub type ConfigFile = HashMap<String, ProfileConfig>;

fn config_dir() -> Result<PathBuf> {
    let dir = dirs::home_dir()
        .context("Cannot determine home directory")?
        .join(".fhir-breather");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn load_profile(profile: &str) -> Result<ProfileConfig> {
    load_profile_from(&config_path()?, profile)
}

pub fn save_profile(profile: &str, config: &ProfileConfig) -> Result<()> {
    save_profile_to(&config_path()?, profile, config)
}

fn load_all_from(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let cfg: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    Ok(cfg)
}

fn load_profile_from(path: &Path, profile: &str) -> Result<ProfileConfig> {
    let mut all = load_all_from(path)?;
    Ok(all.remove(profile).unwrap_or_default())
}

fn save_profile_to(path: &Path, profile: &str, config: &ProfileConfig) -> Result<()> {
    let mut all = load_all_from(path)?;
    all.insert(profile.to_string(), config.clone());
    let content = toml::to_string_pretty(&all)?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn parse_format(value: &str) -> Result<OutputFormat> {
    OutputFormat::from_str(value, true)
        .map_err(|_| anyhow::anyhow!("Unknown format: {value}. Valid formats: json, yaml, table"))
}

/// Effective settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub profile: String,
    pub credentials: Credentials,
    pub model: String,
    pub api_base: String,
    pub discovery_url: String,
    pub format: OutputFormat,
}

impl Settings {
    pub fn load(cli: &Cli) -> Result<Self> {
        let profile = load_profile(&cli.profile)?;
        let settings = Self::resolve(cli, profile)?;
        tracing::debug!(
            profile = %settings.profile,
            credentials = ?settings.credentials,
            model = %settings.model,
            "Settings resolved"
        );
        Ok(settings)
    }

    /// Flag or env first, then the profile, then the built-in default.
    pub fn resolve(cli: &Cli, profile: ProfileConfig) -> Result<Self> {
        let format = match (cli.format, profile.format.as_deref()) {
            (Some(format), _) => format,
            (None, Some(raw)) => parse_format(raw)?,
            (None, None) => OutputFormat::default(),
        };
        let credentials = Credentials::new(
            cli.api_key.clone(),
            cli.fhir_url.clone().or(profile.fhir_url),
        );

        Ok(Self {
            profile: cli.profile.clone(),
            credentials,
            model: cli
                .model
                .clone()
                .or(profile.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: cli
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            discovery_url: cli
                .discovery_url
                .clone()
                .or(profile.discovery_url)
                .unwrap_or_else(|| DEFAULT_DISCOVERY_URL.to_string()),
            format,
        })
    }
}
