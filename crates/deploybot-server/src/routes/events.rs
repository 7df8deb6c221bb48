//! Slack Events API endpoint.
//!
//! Slack expects an answer within three seconds, so an accepted mention is
//! acknowledged immediately and the deployment runs on its own task.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use deploybot_core::collab::Narrator;
use deploybot_core::mention::parse_mention;
use deploybot_core::types::ThreadRef;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::runs::RunTrigger;
use crate::state::AppState;

const NO_RETRY_HEADER: &str = "x-slack-no-retry";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Envelope {
    UrlVerification { challenge: String },
    EventCallback { event: InnerEvent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InnerEvent {
    AppMention(AppMention),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AppMention {
    channel: String,
    text: String,
    ts: String,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    user: Option<String>,
}

impl AppMention {
    /// Reply in the thread the mention lives in, or start one under it.
    fn thread(&self) -> ThreadRef {
        let ts = self.thread_ts.clone().unwrap_or_else(|| self.ts.clone());
        ThreadRef::new(&self.channel, Some(ts))
    }
}

/// POST /events
pub async fn slack_events(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let now = chrono::Utc::now().timestamp();
    if let Err(e) = app.verifier.verify_headers(&headers, &body, now) {
        warn!(error = %e, "rejected Slack request");
        return Err(e.into());
    }

    let envelope: Envelope = serde_json::from_slice(&body)?;
    match envelope {
        Envelope::UrlVerification { challenge } => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            challenge,
        )
            .into_response()),
        Envelope::EventCallback { event } => {
            if let InnerEvent::AppMention(mention) = event {
                dispatch_mention(&app, mention);
            }
            let mut response = StatusCode::OK.into_response();
            if app.no_retry {
                response
                    .headers_mut()
                    .insert(NO_RETRY_HEADER, HeaderValue::from_static("1"));
            }
            Ok(response)
        }
        Envelope::Other => Ok(StatusCode::OK.into_response()),
    }
}

fn dispatch_mention(app: &AppState, mention: AppMention) {
    let narrator = Narrator::new(app.sink.clone(), mention.thread());
    info!(channel = %mention.channel, user = ?mention.user, "app mention received");

    let request = match parse_mention(&mention.text) {
        Ok(request) => request,
        Err(e) => {
            let text = e.narration();
            tokio::spawn(async move { narrator.say(&text).await });
            return;
        }
    };

    let Some(guard) = app
        .runs
        .try_acquire(&request.application, RunTrigger::Mention)
    else {
        warn!(app = %request.application, "deployment already in progress");
        let text = format!(
            "_A deployment of `{}` is already in progress_",
            request.application
        );
        tokio::spawn(async move { narrator.say(&text).await });
        return;
    };

    let orchestrator = app.orchestrator.clone();
    info!(app = %request.application, run_id = %guard.record().id, "spawning deployment run");
    tokio::spawn(async move {
        let _guard = guard;
        orchestrator.run(&request, &narrator).await;
    });
}
