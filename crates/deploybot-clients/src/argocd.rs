//! Argo CD API client: trigger a sync, read per-resource sync status, and
//! relay GitHub push webhooks.

use async_trait::async_trait;
use deploybot_core::collab::{CollabResult, StatusSource, SyncTrigger, WebhookForwarder};
use deploybot_core::config::ArgoConfig;
use deploybot_core::types::{ResourceStatus, SyncState};
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use tracing::debug;

use crate::http::{decode_json, ensure_success};
use crate::{ClientError, Result};

const SERVICE: &str = "Argo CD";

/// Only these resources count towards rollout consensus.
const DEPLOYABLE_KIND: &str = "Deployment";

// ─── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApplicationBody {
    status: Option<ApplicationStatus>,
}

#[derive(Debug, Deserialize)]
struct ApplicationStatus {
    resources: Option<Vec<ResourceBody>>,
}

#[derive(Debug, Deserialize)]
struct ResourceBody {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: Option<String>,
}

// ─── ArgoClient ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ArgoClient {
    http: Client,
    config: ArgoConfig,
    token: String,
}

impl ArgoClient {
    /// `http` should be built with `config.insecure_skip_verify` applied.
    pub fn new(http: Client, config: ArgoConfig, token: impl Into<String>) -> Self {
        Self {
            http,
            config,
            token: token.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{path}", self.config.server.trim_end_matches('/'));
        debug!(%method, %url, "argocd request");
        self.http.request(method, url).bearer_auth(&self.token)
    }

    pub async fn trigger_sync(&self, app: &str) -> Result<()> {
        let resp = self
            .request(Method::POST, &format!("api/v1/applications/{app}/sync"))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        ensure_success(SERVICE, resp).await?;
        Ok(())
    }

    /// Deployment resources of `app` in listing order.
    pub async fn resource_statuses(&self, app: &str) -> Result<Vec<ResourceStatus>> {
        let resp = self
            .request(Method::GET, &format!("api/v1/applications/{app}"))
            .send()
            .await?;
        let body: ApplicationBody = decode_json(SERVICE, ensure_success(SERVICE, resp).await?).await?;
        let resources = body
            .status
            .and_then(|s| s.resources)
            .ok_or_else(|| ClientError::Decode {
                service: SERVICE,
                reason: format!("application {app} has no status.resources"),
            })?;
        Ok(resources
            .into_iter()
            .filter(|r| r.kind == DEPLOYABLE_KIND)
            .map(|r| {
                let state = r
                    .status
                    .as_deref()
                    .map(SyncState::from_status)
                    .unwrap_or(SyncState::Unknown);
                ResourceStatus::new(r.name, state)
            })
            .collect())
    }

    pub async fn forward_webhook(&self, event: &str, payload: &[u8]) -> Result<()> {
        let resp = self
            .request(Method::POST, "api/webhook")
            .header("X-GitHub-Event", event)
            .header("Content-Type", "application/json")
            .body(payload.to_vec())
            .send()
            .await?;
        ensure_success(SERVICE, resp).await?;
        Ok(())
    }
}

#[async_trait]
impl SyncTrigger for ArgoClient {
    async fn sync(&self, app: &str) -> CollabResult<()> {
        Ok(self.trigger_sync(app).await?)
    }
}

#[async_trait]
impl StatusSource for ArgoClient {
    async fn poll(&self, app: &str) -> CollabResult<Vec<ResourceStatus>> {
        Ok(self.resource_statuses(app).await?)
    }

    fn status_url(&self, app: &str) -> String {
        self.config.application_url(app)
    }
}

#[async_trait]
impl WebhookForwarder for ArgoClient {
    async fn forward(&self, event: &str, payload: &[u8]) -> CollabResult<()> {
        Ok(self.forward_webhook(event, payload).await?)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::build_http_client;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    fn client(url: &str) -> ArgoClient {
        let config = ArgoConfig {
            server: url.to_string(),
            insecure_skip_verify: true,
        };
        let http = build_http_client(Duration::from_secs(5), true).unwrap();
        ArgoClient::new(http, config, "jwt-token")
    }

    #[tokio::test]
    async fn sync_posts_with_bearer_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/applications/checkout/sync")
            .match_header("authorization", "Bearer jwt-token")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        client(&server.url()).trigger_sync("checkout").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn sync_failure_carries_status_and_body() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/v1/applications/checkout/sync")
            .with_status(403)
            .with_body(r#"{"message":"permission denied"}"#)
            .create_async()
            .await;
        let err = client(&server.url()).sync("checkout").await.unwrap_err();
        assert!(err.to_string().contains("403"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn statuses_keep_only_deployments_in_order() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/applications/checkout")
            .with_status(200)
            .with_body(
                r#"{"metadata":{"name":"checkout"},"status":{"resources":[
                    {"kind":"Service","name":"checkout","status":"Synced"},
                    {"kind":"Deployment","name":"checkout-web","status":"Synced"},
                    {"kind":"ConfigMap","name":"checkout-env","status":"OutOfSync"},
                    {"kind":"Deployment","name":"checkout-worker","status":"OutOfSync"},
                    {"kind":"Deployment","name":"checkout-cron"}]}}"#,
            )
            .create_async()
            .await;

        let statuses = client(&server.url()).poll("checkout").await.unwrap();
        assert_eq!(
            statuses,
            vec![
                ResourceStatus::new("checkout-web", SyncState::Synced),
                ResourceStatus::new("checkout-worker", SyncState::OutOfSync),
                ResourceStatus::new("checkout-cron", SyncState::Unknown),
            ]
        );
    }

    #[tokio::test]
    async fn missing_resources_is_a_decode_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/applications/checkout")
            .with_status(200)
            .with_body(r#"{"status":{}}"#)
            .create_async()
            .await;
        let err = client(&server.url())
            .resource_statuses("checkout")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[tokio::test]
    async fn webhook_is_forwarded_verbatim() {
        let mut server = Server::new_async().await;
        let payload = br#"{"ref":"refs/heads/main"}"#;
        let mock = server
            .mock("POST", "/api/webhook")
            .match_header("x-github-event", "push")
            .match_body(Matcher::Exact(String::from_utf8_lossy(payload).into_owned()))
            .with_status(200)
            .create_async()
            .await;
        client(&server.url()).forward("push", payload).await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn status_url_points_at_the_ui() {
        let c = client("https://argocd.example.com/");
        assert_eq!(
            c.status_url("checkout"),
            "https://argocd.example.com/applications/checkout"
        );
    }
}
