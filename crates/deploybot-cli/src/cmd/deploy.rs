use crate::output::print_json;
use anyhow::Context;
use async_trait::async_trait;
use deploybot_clients::Clients;
use deploybot_core::collab::{Narrator, NotificationSink};
use deploybot_core::config::Secrets;
use deploybot_core::orchestrator::{Orchestrator, RunOutcome};
use deploybot_core::types::{DeploymentRequest, ThreadRef};
use std::path::Path;
use std::sync::Arc;

/// Narration for an operator watching the terminal.
struct StdoutSink;

#[async_trait]
impl NotificationSink for StdoutSink {
    async fn send(&self, _thread: &ThreadRef, text: &str) {
        println!("{text}");
    }
}

pub fn run(config_path: &Path, app: &str, reference: &str, json: bool) -> anyhow::Result<()> {
    let config = super::load_valid_config(config_path)?;
    let secrets = Secrets::from_env().context("missing credentials")?;
    let clients = Clients::build(&config, &secrets)?;
    let orchestrator = Orchestrator::new(&config, clients.collaborators());

    let request = DeploymentRequest::new(app, reference);
    let narrator = Narrator::new(Arc::new(StdoutSink), ThreadRef::new("terminal", None));

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(orchestrator.run(&request, &narrator));

    let report = report(app, outcome)?;
    if json {
        print_json(&report)?;
    }
    Ok(())
}

/// The machine-readable summary of a run that reached the sync stage.
///
/// An unconfirmed rollout is not a failure of the command: the operator has
/// already been told to look at Argo CD.
fn report(app: &str, outcome: RunOutcome) -> anyhow::Result<serde_json::Value> {
    match outcome {
        RunOutcome::Deployed { artifact, tally } => Ok(serde_json::json!({
            "status": "deployed",
            "artifact": artifact.to_string(),
            "polls": tally.iteration,
        })),
        RunOutcome::GaveUp { artifact, tally } => Ok(serde_json::json!({
            "status": "gave_up",
            "artifact": artifact.to_string(),
            "polls": tally.iteration,
        })),
        RunOutcome::Failed(err) => Err(err).context(format!("deployment of {app} failed")),
    }
}
