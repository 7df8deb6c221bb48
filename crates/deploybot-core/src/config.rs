use crate::error::{DeployError, Result};
use crate::types::is_valid_application;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "deploybot.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// GithubConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_github_api")]
    pub api_url: String,
    /// Organisation owning both the application repos and the manifest repo.
    #[serde(default)]
    pub owner: String,
    #[serde(default = "default_manifest_repo")]
    pub manifest_repo: String,
    #[serde(default = "default_branch")]
    pub manifest_branch: String,
    /// Path of the values file inside `manifest_repo`; `{app}` is substituted.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,
    #[serde(default = "default_branch")]
    pub main_branch: String,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_manifest_repo() -> String {
    "deployments".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_manifest_path() -> String {
    "{app}/values.yaml".to_string()
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api(),
            owner: String::new(),
            manifest_repo: default_manifest_repo(),
            manifest_branch: default_branch(),
            manifest_path: default_manifest_path(),
            main_branch: default_branch(),
        }
    }
}

impl GithubConfig {
    pub fn manifest_path_for(&self, app: &str) -> String {
        self.manifest_path.replace("{app}", app)
    }

    /// Inverse of [`manifest_path_for`](Self::manifest_path_for): the
    /// application whose values file lives at `path`, if any.
    pub fn application_for_manifest(&self, path: &str) -> Option<String> {
        let (prefix, suffix) = self.manifest_path.split_once("{app}")?;
        let app = path.strip_prefix(prefix)?.strip_suffix(suffix)?;
        is_valid_application(app).then(|| app.to_string())
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig / ArtifactConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the OCI registry, e.g. `https://123.dkr.ecr.us-east-1.amazonaws.com`.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub repository_prefix: String,
}

impl RegistryConfig {
    pub fn repository_for(&self, app: &str) -> String {
        format!("{}{}", self.repository_prefix, app)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_tag_length")]
    pub tag_length: usize,
}

fn default_tag_length() -> usize {
    7
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            tag_length: default_tag_length(),
        }
    }
}

// ---------------------------------------------------------------------------
// ArgoConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgoConfig {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

impl ArgoConfig {
    /// Browser URL of an application in the Argo CD UI.
    pub fn application_url(&self, app: &str) -> String {
        format!("{}/applications/{app}", self.server.trim_end_matches('/'))
    }
}

// ---------------------------------------------------------------------------
// ManifestConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    #[serde(default = "default_tag_path")]
    pub tag_path: String,
}

fn default_tag_path() -> String {
    "image.tag".to_string()
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            tag_path: default_tag_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// PollingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Wait before the first poll so the control plane can pick up the webhook.
    #[serde(default = "default_grace_delay_secs")]
    pub grace_delay_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_grace_delay_secs() -> u64 {
    2
}

fn default_interval_secs() -> u64 {
    4
}

fn default_max_iterations() -> u32 {
    6
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            grace_delay_secs: default_grace_delay_secs(),
            interval_secs: default_interval_secs(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl PollingConfig {
    pub fn settings(&self) -> PollSettings {
        PollSettings {
            grace_delay: Duration::from_secs(self.grace_delay_secs),
            interval: Duration::from_secs(self.interval_secs),
            max_iterations: self.max_iterations,
        }
    }
}

/// Timing for one polling sub-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub grace_delay: Duration,
    pub interval: Duration,
    pub max_iterations: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollingConfig::default().settings()
    }
}

// ---------------------------------------------------------------------------
// HttpConfig / SlackConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Applied to every outbound request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    15
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default = "default_slack_api")]
    pub api_url: String,
    /// Ask Slack not to redeliver events we were slow to acknowledge.
    #[serde(default = "default_no_retry")]
    pub no_retry: bool,
    /// Channel for narration of webhook-triggered syncs. Logged only when unset.
    #[serde(default)]
    pub relay_channel: Option<String>,
}

fn default_slack_api() -> String {
    "https://slack.com/api".to_string()
}

fn default_no_retry() -> bool {
    true
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_url: default_slack_api(),
            no_retry: default_no_retry(),
            relay_channel: None,
        }
    }
}

// ---------------------------------------------------------------------------
// DeployConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub artifact: ArtifactConfig,
    #[serde(default)]
    pub argocd: ArgoConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub slack: SlackConfig,
}

impl DeployConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: DeployConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if self.github.owner.trim().is_empty() {
            error("github.owner is not set".to_string());
        }
        if !self.github.manifest_path.contains("{app}") {
            error(format!(
                "github.manifest_path '{}' does not contain {{app}}",
                self.github.manifest_path
            ));
        }
        if self.registry.url.trim().is_empty() {
            error("registry.url is not set".to_string());
        }
        if self.argocd.server.trim().is_empty() {
            error("argocd.server is not set".to_string());
        }
        if self.manifest.tag_path.split('.').any(|seg| seg.is_empty()) {
            error(format!(
                "manifest.tag_path '{}' has an empty segment",
                self.manifest.tag_path
            ));
        }
        if self.polling.max_iterations == 0 {
            error("polling.max_iterations must be at least 1".to_string());
        }
        if self.artifact.tag_length == 0 {
            error("artifact.tag_length must be at least 1".to_string());
        }

        if self.argocd.insecure_skip_verify {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "argocd.insecure_skip_verify disables TLS verification".to_string(),
            });
        }
        if self.http.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "http.timeout_secs is 0; outbound calls will fail immediately"
                    .to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Environment variables [`Secrets::from_env`] cannot do without.
pub const REQUIRED_SECRETS: [&str; 4] = [
    "GITHUB_TOKEN",
    "ARGOCD_JWT",
    "SLACK_BOT_TOKEN",
    "SLACK_SIGNING_SECRET",
];

/// Credentials read from the environment. Never written to disk.
#[derive(Clone)]
pub struct Secrets {
    pub github_token: String,
    pub argocd_jwt: String,
    pub slack_bot_token: String,
    pub slack_signing_secret: String,
    /// Full `Authorization` header value for the registry, if it needs one.
    pub registry_auth: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("github_token", &"<redacted>")
            .field("argocd_jwt", &"<redacted>")
            .field("slack_bot_token", &"<redacted>")
            .field("slack_signing_secret", &"<redacted>")
            .field("registry_auth", &self.registry_auth.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| DeployError::Config(format!("environment variable {key} is not set")))
        };
        Ok(Self {
            github_token: required("GITHUB_TOKEN")?,
            argocd_jwt: required("ARGOCD_JWT")?,
            slack_bot_token: required("SLACK_BOT_TOKEN")?,
            slack_signing_secret: required("SLACK_SIGNING_SECRET")?,
            registry_auth: lookup("REGISTRY_AUTH").filter(|v| !v.trim().is_empty()),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
