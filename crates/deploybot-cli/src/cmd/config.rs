use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use deploybot_core::config::{ConfigWarning, DeployConfig, WarnLevel, REQUIRED_SECRETS};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate the config file and the secrets in the environment
    Check,

    /// Print the effective config, defaults included
    Show,
}

pub fn run(path: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Check => check(path, json),
        ConfigSubcommand::Show => show(path, json),
    }
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

fn check(path: &Path, json: bool) -> anyhow::Result<()> {
    let config = DeployConfig::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    let mut warnings = config.validate();
    warnings.extend(missing_secrets(|key| std::env::var(key).ok()));

    if json {
        let value = serde_json::json!({
            "path": path.display().to_string(),
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}

/// Unset secrets are warnings: `config check` can run where the server will not.
fn missing_secrets(lookup: impl Fn(&str) -> Option<String>) -> Vec<ConfigWarning> {
    REQUIRED_SECRETS
        .into_iter()
        .filter(|&key| lookup(key).map_or(true, |v| v.trim().is_empty()))
        .map(|key| ConfigWarning {
            level: WarnLevel::Warning,
            message: format!("environment variable {key} is not set"),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(path: &Path, json: bool) -> anyhow::Result<()> {
    let config = DeployConfig::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    if json {
        print_json(&config)?;
    } else {
        print!("{}", serde_yaml::to_string(&config)?);
    }
    Ok(())
}
