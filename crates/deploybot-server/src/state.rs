use std::sync::Arc;

use deploybot_clients::Clients;
use deploybot_core::collab::{
    Collaborators, LogSink, Narrator, NotificationSink, SyncTrigger, WebhookForwarder,
};
use deploybot_core::config::{DeployConfig, GithubConfig, Secrets};
use deploybot_core::orchestrator::Orchestrator;
use deploybot_core::reconciler::StatusReconciler;
use deploybot_core::types::ThreadRef;

use crate::runs::RunRegistry;
use crate::signature::SlackVerifier;

/// Thread label used when relay narration goes to the log.
const RELAY_LOG_CHANNEL: &str = "gitshot";

/// The external services a server needs beyond the pipeline collaborators.
#[derive(Clone)]
pub struct Services {
    pub collaborators: Collaborators,
    pub sink: Arc<dyn NotificationSink>,
    pub forwarder: Arc<dyn WebhookForwarder>,
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub sync: Arc<dyn SyncTrigger>,
    pub forwarder: Arc<dyn WebhookForwarder>,
    /// Chat sink for mention-triggered runs.
    pub sink: Arc<dyn NotificationSink>,
    /// Where webhook-triggered reconciliation narrates.
    pub relay: Narrator,
    /// Manifest repository layout, for mapping pushes back to applications.
    pub github: GithubConfig,
    pub verifier: SlackVerifier,
    pub runs: RunRegistry,
    pub no_retry: bool,
}

impl AppState {
    pub fn new(config: &DeployConfig, services: Services, signing_secret: impl Into<String>) -> Self {
        let relay = match &config.slack.relay_channel {
            Some(channel) => Narrator::new(services.sink.clone(), ThreadRef::new(channel, None)),
            None => Narrator::new(Arc::new(LogSink), ThreadRef::new(RELAY_LOG_CHANNEL, None)),
        };
        Self {
            orchestrator: Orchestrator::new(config, services.collaborators.clone()),
            sync: services.collaborators.sync.clone(),
            forwarder: services.forwarder,
            sink: services.sink,
            relay,
            github: config.github.clone(),
            verifier: SlackVerifier::new(signing_secret),
            runs: RunRegistry::default(),
            no_retry: config.slack.no_retry,
        }
    }

    /// Wire the live HTTP clients.
    pub fn from_config(config: &DeployConfig, secrets: &Secrets) -> anyhow::Result<Self> {
        let clients = Clients::build(config, secrets)?;
        let services = Services {
            collaborators: clients.collaborators(),
            sink: clients.slack.clone(),
            forwarder: clients.argocd.clone(),
        };
        Ok(Self::new(config, services, secrets.slack_signing_secret.clone()))
    }

    pub fn reconciler(&self) -> &StatusReconciler {
        self.orchestrator.reconciler()
    }
}
