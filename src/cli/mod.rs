//! # Command Line Interface
//!
//! Loads configuration the same way an embedding application would and prints
//! what it found. Logs go to stderr; command output goes to stdout.

use crate::config::{ManagerSettings, ObservabilityConfig};
use crate::manager::{ConfigManager, ValidationRule};
use crate::observability::{init_observability, log_settings_info};
use crate::secrets::SecretString;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

#[derive(Parser)]
#[command(name = "cfgsync")]
#[command(about = "Load and inspect application configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the .env files
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Environment name, selects .env.<environment>
    #[arg(short, long, global = true)]
    pub environment: Option<String>,

    /// Base URL of the secrets service
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Key that must be present (repeatable)
    #[arg(long = "require", value_name = "KEY", global = true)]
    pub required: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a single value
    Get {
        /// Configuration key (case-sensitive)
        key: String,
    },
    /// Print every key as JSON, values redacted
    Dump {
        /// Print values in clear text
        #[arg(long)]
        reveal: bool,
    },
    /// Print health status as JSON
    Health,
    /// Print manager statistics as JSON
    Stats,
}

impl Cli {
    /// Apply command line overrides on top of environment settings.
    pub fn apply_overrides(&self, settings: &mut ManagerSettings) {
        if let Some(dir) = &self.config_dir {
            settings.config_dir = dir.clone();
        }
        if let Some(environment) = &self.environment {
            settings.environment = environment.clone();
        }
        if let Some(base_url) = &self.base_url {
            settings.base_url = base_url.clone();
        }
    }
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let mut observability = ObservabilityConfig::from_env()?;
    if cli.verbose {
        observability.log_level = "debug".to_string();
    }
    init_observability(&observability)?;

    let mut settings = ManagerSettings::from_env()?;
    cli.apply_overrides(&mut settings);
    settings.validate()?;
    log_settings_info(&settings);

    let manager = ConfigManager::builder()
        .settings(settings)
        .rules(cli.required.iter().map(|key| ValidationRule::required(key.as_str())))
        .build();

    let initialized = manager.initialize().await;

    match cli.command {
        Commands::Get { key } => {
            initialized?;
            match manager.get(&key)? {
                Some(value) => println!("{}", value),
                None => anyhow::bail!("Configuration key '{}' is not set", key),
            }
        }
        Commands::Dump { reveal } => {
            initialized?;
            print_json(&dump_values(manager.get_all()?, reveal))?;
        }
        // Health and stats still report when initialization failed.
        Commands::Health => {
            if let Err(e) = &initialized {
                warn!(error = %e, "Initialization failed");
            }
            print_json(&manager.health_status())?;
        }
        Commands::Stats => {
            if let Err(e) = &initialized {
                warn!(error = %e, "Initialization failed");
            }
            print_json(&manager.stats())?;
        }
    }

    Ok(())
}

/// Sorted key/value output, redacted unless `reveal` is set.
pub fn dump_values(
    values: impl IntoIterator<Item = (String, String)>,
    reveal: bool,
) -> BTreeMap<String, String> {
    values
        .into_iter()
        .map(|(key, value)| {
            let shown = if reveal { value } else { SecretString::new(value).describe() };
            (key, shown)
        })
        .collect()
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cfgsync",
            "dump",
            "--reveal",
            "--environment",
            "staging",
            "--require",
            "DATABASE_URL",
            "--require",
            "API_KEY",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::Dump { reveal: true }));
        assert_eq!(cli.required, vec!["DATABASE_URL", "API_KEY"]);

        let mut settings = ManagerSettings::default();
        cli.apply_overrides(&mut settings);
        assert_eq!(settings.environment, "staging");
        assert_eq!(settings.base_url, ManagerSettings::default().base_url);
    }

    #[test]
    fn test_dump_redacts_by_default() {
        let values = vec![("TOKEN".to_string(), "hunter2".to_string())];

        let redacted = dump_values(values.clone(), false);
        assert_eq!(redacted["TOKEN"], "[REDACTED 7 chars]");

        let revealed = dump_values(values, true);
        assert_eq!(revealed["TOKEN"], "hunter2");
    }
}
