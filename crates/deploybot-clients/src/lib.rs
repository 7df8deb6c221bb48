//! `deploybot-clients`: HTTP implementations of the collaborator traits in
//! `deploybot_core::collab`.
//!
//! # Architecture
//!
//! ```text
//! DeployConfig + Secrets
//!     │
//!     ▼
//! Clients::build   ← one reqwest::Client per trust setting, shared timeout
//!     │
//!     ├── GithubClient    SourceControl      (pulls, commits, check-runs, contents)
//!     ├── RegistryClient  ArtifactRegistry   (HEAD /v2/{repo}/manifests/{tag})
//!     ├── ArgoClient      SyncTrigger + StatusSource + WebhookForwarder
//!     └── SlackClient     NotificationSink   (chat.postMessage)
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use deploybot_clients::Clients;
//! use deploybot_core::config::{DeployConfig, Secrets};
//!
//! let config = DeployConfig::load("deploybot.yaml".as_ref())?;
//! let clients = Clients::build(&config, &Secrets::from_env()?)?;
//! let orchestrator = Orchestrator::new(&config, clients.collaborators());
//! ```

pub mod argocd;
pub mod error;
pub mod github;
pub mod http;
pub mod registry;
pub mod slack;

use std::sync::Arc;

use deploybot_core::collab::Collaborators;
use deploybot_core::config::{DeployConfig, Secrets};

pub use argocd::ArgoClient;
pub use error::ClientError;
pub use github::GithubClient;
pub use registry::RegistryClient;
pub use slack::SlackClient;

pub type Result<T> = std::result::Result<T, ClientError>;

// ─── Clients ──────────────────────────────────────────────────────────────

/// All live clients for one process.
#[derive(Clone)]
pub struct Clients {
    pub github: Arc<GithubClient>,
    pub registry: Arc<RegistryClient>,
    pub argocd: Arc<ArgoClient>,
    pub slack: Arc<SlackClient>,
}

impl Clients {
    pub fn build(config: &DeployConfig, secrets: &Secrets) -> Result<Self> {
        let timeout = config.http.timeout();
        let verified = http::build_http_client(timeout, false)?;
        // Argo CD is often fronted by a self-signed certificate.
        let argo_http = if config.argocd.insecure_skip_verify {
            http::build_http_client(timeout, true)?
        } else {
            verified.clone()
        };

        Ok(Self {
            github: Arc::new(GithubClient::new(
                verified.clone(),
                config.github.clone(),
                secrets.github_token.clone(),
            )),
            registry: Arc::new(RegistryClient::new(
                verified.clone(),
                config.registry.url.clone(),
                secrets.registry_auth.clone(),
            )),
            argocd: Arc::new(ArgoClient::new(
                argo_http,
                config.argocd.clone(),
                secrets.argocd_jwt.clone(),
            )),
            slack: Arc::new(SlackClient::new(
                verified,
                config.slack.api_url.clone(),
                secrets.slack_bot_token.clone(),
            )),
        })
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            scm: self.github.clone(),
            registry: self.registry.clone(),
            sync: self.argocd.clone(),
            status: self.argocd.clone(),
        }
    }
}
