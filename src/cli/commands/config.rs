//! Implementation of the `pundit config` commands.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::credentials::resolve_credentials;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the merged configuration
    Show,

    /// Validate the configuration and report which credentials resolve
    Validate,
}

#[derive(Debug, Serialize)]
pub struct ShowOutput {
    #[serde(skip)]
    yaml: String,
    config: Config,
}

impl CommandOutput for ShowOutput {
    fn to_human(&self) -> String {
        self.yaml.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct ValidateOutput {
    pub valid: bool,
    pub personas: usize,
    pub fallback_targets: usize,
    pub credentials_configured: usize,
    pub credentials_resolved: Vec<String>,
}

impl CommandOutput for ValidateOutput {
    fn to_human(&self) -> String {
        let mut lines = vec!["Configuration is valid.".to_string()];
        lines.push(format!("  Personas: {}", self.personas));
        lines.push(format!("  Fallback targets: {}", self.fallback_targets));
        lines.push(format!(
            "  Credentials resolved: {} of {}",
            self.credentials_resolved.len(),
            self.credentials_configured
        ));
        for id in &self.credentials_resolved {
            lines.push(format!("    - {id}"));
        }
        if self.credentials_resolved.is_empty() {
            lines.push("  No credential resolved; only `select --mock` will run.".to_string());
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Configuration is loaded and validated before any command runs, so both
/// subcommands only report on it.
pub fn execute(command: ConfigCommands, config: Config, json_mode: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let yaml = serde_yaml::to_string(&config).context("Failed to render configuration")?;
            output(&ShowOutput { yaml, config }, json_mode);
        }
        ConfigCommands::Validate => {
            let resolved = resolve_credentials(&config.dispatch.credentials);
            let result = ValidateOutput {
                valid: true,
                personas: config.panel.personas.len(),
                fallback_targets: config.dispatch.fallback_chain.len(),
                credentials_configured: config.dispatch.credentials.len(),
                credentials_resolved: resolved.into_iter().map(|c| c.id).collect(),
            };
            output(&result, json_mode);
        }
    }
    Ok(())
}
