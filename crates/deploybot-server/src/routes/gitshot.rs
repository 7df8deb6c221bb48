//! GitHub webhook relay.
//!
//! The push is forwarded to Argo CD so it refreshes immediately, then every
//! application the push touched is synced and reconciled like stage 6 of a
//! chat run, narrating to the relay channel.
//!
//! A push to the manifest repository names its applications through the
//! values files it adds or modifies. A push to any other repository names the
//! application after the repository itself.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use deploybot_core::config::GithubConfig;
use deploybot_core::error::DeployError;
use deploybot_core::types::is_valid_application;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::runs::RunTrigger;
use crate::state::AppState;

const EVENT_HEADER: &str = "x-github-event";
const DEFAULT_EVENT: &str = "push";

#[derive(Debug, Deserialize)]
struct PushPayload {
    repository: Repository,
    #[serde(default)]
    commits: Vec<PushCommit>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PushCommit {
    #[serde(default)]
    added: Vec<String>,
    #[serde(default)]
    modified: Vec<String>,
}

/// Applications a push should sync, in first-touched order.
fn applications(payload: &PushPayload, github: &GithubConfig) -> Result<Vec<String>, AppError> {
    let repo = &payload.repository.name;
    if *repo != github.manifest_repo {
        if !is_valid_application(repo) {
            return Err(AppError::bad_request(format!(
                "'{repo}' is not a valid application name"
            )));
        }
        return Ok(vec![repo.clone()]);
    }

    let mut apps: Vec<String> = Vec::new();
    let touched = payload
        .commits
        .iter()
        .flat_map(|c| c.added.iter().chain(c.modified.iter()));
    for path in touched {
        if let Some(app) = github.application_for_manifest(path) {
            if !apps.contains(&app) {
                apps.push(app);
            }
        }
    }
    Ok(apps)
}

/// POST /gitshot
pub async fn relay_webhook(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_EVENT)
        .to_string();
    let payload: PushPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("payload has no repository name: {e}")))?;
    let targets = applications(&payload, &app.github)?;
    let repo = payload.repository.name;

    app.forwarder.forward(&event, &body).await.map_err(|e| {
        warn!(repo = %repo, error = %e, "webhook forward failed");
        AppError::upstream(format!("forwarding {event} webhook failed: {e}"))
    })?;

    let mut runs = Vec::new();
    let mut busy = Vec::new();
    for target in targets {
        let Some(guard) = app.runs.try_acquire(&target, RunTrigger::Webhook) else {
            busy.push(target);
            continue;
        };
        let run_id = guard.record().id.clone();
        runs.push(serde_json::json!({ "app": target, "run_id": run_id }));

        let sync = app.sync.clone();
        let reconciler = app.reconciler().clone();
        let narrator = app.relay.clone();
        info!(app = %target, %repo, %event, %run_id, "webhook relayed; spawning sync");
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = sync.sync(&target).await {
                let err = DeployError::SyncTriggerFailed {
                    app: target.clone(),
                    reason: e.to_string(),
                };
                warn!(app = %target, error = %err, "relay sync failed");
                narrator.say(&err.narration()).await;
                return;
            }
            narrator.say(&format!("_`{target}` sync underway_")).await;
            reconciler.reconcile(&target, &narrator).await;
        });
    }

    if runs.is_empty() && !busy.is_empty() {
        return Err(AppError::conflict(format!(
            "a deployment of '{}' is already in progress",
            busy.join("', '")
        )));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "repository": repo, "runs": runs, "busy": busy })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> PushPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn app_repo_push_names_the_repo() {
        let p = payload(r#"{"repository":{"name":"checkout"}}"#);
        let apps = applications(&p, &GithubConfig::default()).unwrap();
        assert_eq!(apps, ["checkout"]);
    }

    #[test]
    fn unsafe_repo_name_is_rejected() {
        for name in ["../../../session", "a/b", ""] {
            let p = payload(&format!(r#"{{"repository":{{"name":"{name}"}}}}"#));
            assert!(applications(&p, &GithubConfig::default()).is_err(), "{name:?}");
        }
    }

    #[test]
    fn manifest_repo_push_names_touched_values_files() {
        let p = payload(
            r#"{"repository":{"name":"deployments"},"commits":[
                {"added":["billing/values.yaml"],"modified":["checkout/values.yaml","README.md"]},
                {"modified":["checkout/values.yaml","../x/values.yaml"]}
            ]}"#,
        );
        let apps = applications(&p, &GithubConfig::default()).unwrap();
        assert_eq!(apps, ["billing", "checkout"]);
    }

    #[test]
    fn manifest_repo_push_without_values_files_names_nothing() {
        let p = payload(r#"{"repository":{"name":"deployments"},"commits":[{"modified":["README.md"]}]}"#);
        assert!(applications(&p, &GithubConfig::default()).unwrap().is_empty());
    }
}
