//! Slack Web API sink. Posting is best-effort: failures are logged and the
//! run carries on.

use async_trait::async_trait;
use deploybot_core::collab::NotificationSink;
use deploybot_core::types::ThreadRef;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::http::{decode_json, ensure_success};
use crate::{ClientError, Result};

const SERVICE: &str = "Slack";

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SlackClient {
    http: Client,
    api_url: String,
    token: String,
}

impl SlackClient {
    pub fn new(http: Client, api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub async fn post_message(&self, thread: &ThreadRef, text: &str) -> Result<()> {
        let body = PostMessage {
            channel: &thread.channel,
            text,
            thread_ts: thread.thread_ts.as_deref(),
        };
        let resp = self
            .http
            .post(format!("{}/chat.postMessage", self.api_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let reply: SlackResponse = decode_json(SERVICE, ensure_success(SERVICE, resp).await?).await?;
        if !reply.ok {
            return Err(ClientError::Decode {
                service: SERVICE,
                reason: reply.error.unwrap_or_else(|| "ok=false".to_string()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for SlackClient {
    async fn send(&self, thread: &ThreadRef, text: &str) {
        if let Err(e) = self.post_message(thread, text).await {
            warn!(channel = %thread.channel, error = %e, "failed to post to Slack");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::build_http_client;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    fn client(url: &str) -> SlackClient {
        let http = build_http_client(Duration::from_secs(5), false).unwrap();
        SlackClient::new(http, url, "xoxb-test")
    }

    #[tokio::test]
    async fn posts_into_the_thread() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat.postMessage")
            .match_header("authorization", "Bearer xoxb-test")
            .match_body(Matcher::Json(serde_json::json!({
                "channel": "C123",
                "text": "_`checkout` Synced_",
                "thread_ts": "1700000000.000100",
            })))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let thread = ThreadRef::new("C123", Some("1700000000.000100".to_string()));
        client(&server.url())
            .post_message(&thread, "_`checkout` Synced_")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn top_level_post_omits_thread_ts() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat.postMessage")
            .match_body(Matcher::Json(serde_json::json!({
                "channel": "C123",
                "text": "hello",
            })))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;
        client(&server.url())
            .post_message(&ThreadRef::new("C123", None), "hello")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_level_failure_is_reported() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat.postMessage")
            .with_status(200)
            .with_body(r#"{"ok":false,"error":"channel_not_found"}"#)
            .create_async()
            .await;
        let err = client(&server.url())
            .post_message(&ThreadRef::new("C404", None), "hi")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("channel_not_found"));
    }

    #[tokio::test]
    async fn send_swallows_failures() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat.postMessage")
            .with_status(500)
            .create_async()
            .await;
        client(&server.url())
            .send(&ThreadRef::new("C123", None), "hi")
            .await;
        mock.assert_async().await;
    }
}
