pub mod config;
pub mod deploy;
pub mod serve;

use anyhow::Context;
use deploybot_core::config::DeployConfig;
use std::path::Path;

/// Load the config file and refuse to continue when validation finds errors.
pub fn load_valid_config(path: &Path) -> anyhow::Result<DeployConfig> {
    use deploybot_core::config::WarnLevel;

    let config = DeployConfig::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    let errors: Vec<String> = config
        .validate()
        .into_iter()
        .filter(|w| w.level == WarnLevel::Error)
        .map(|w| w.message)
        .collect();
    if !errors.is_empty() {
        anyhow::bail!(
            "invalid config {}: {}",
            path.display(),
            errors.join("; ")
        );
    }
    Ok(config)
}
