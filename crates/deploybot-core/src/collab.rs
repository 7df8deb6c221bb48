//! Seams to the external systems a deployment touches.
//!
//! The pipeline only sees these traits; HTTP implementations live in
//! `deploybot-clients` and in-memory ones in [`crate::testing`].

use crate::types::{
    ArtifactIdentifier, CommitInfo, ManifestFile, PullRequest, ResourceStatus, ThreadRef,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// A collaborator call that failed. Only the message crosses the seam.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type CollabResult<T> = std::result::Result<T, CollaboratorError>;

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// `Ok(None)` when the pull request does not exist.
    async fn pull_request(&self, app: &str, number: u64) -> CollabResult<Option<PullRequest>>;

    /// Commit SHA at the tip of `branch` in the application's repository.
    async fn branch_head(&self, app: &str, branch: &str) -> CollabResult<String>;

    /// True once every check run for the commit has finished.
    async fn checks_completed(&self, app: &str, commit_sha: &str) -> CollabResult<bool>;

    async fn download_manifest(&self, app: &str) -> CollabResult<ManifestFile>;

    async fn commit_manifest(
        &self,
        file: &ManifestFile,
        content: &str,
        message: &str,
    ) -> CollabResult<CommitInfo>;
}

#[async_trait]
pub trait ArtifactRegistry: Send + Sync {
    async fn image_exists(&self, artifact: &ArtifactIdentifier) -> CollabResult<bool>;
}

#[async_trait]
pub trait SyncTrigger: Send + Sync {
    /// Ask the GitOps control plane to reconcile `app`. The response body is
    /// not inspected.
    async fn sync(&self, app: &str) -> CollabResult<()>;
}

#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Deployable resources of `app` in the order the control plane lists them.
    async fn poll(&self, app: &str) -> CollabResult<Vec<ResourceStatus>>;

    /// Human-navigable page for `app`, used in the give-up narration.
    fn status_url(&self, app: &str) -> String;
}

/// Hands a source-control push event to the GitOps control plane.
#[async_trait]
pub trait WebhookForwarder: Send + Sync {
    async fn forward(&self, event: &str, payload: &[u8]) -> CollabResult<()>;
}

/// One-way chat channel. Sends are fire-and-forget: implementations log
/// failures and never report them to the caller.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, thread: &ThreadRef, text: &str);
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Everything one orchestration run calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub scm: Arc<dyn SourceControl>,
    pub registry: Arc<dyn ArtifactRegistry>,
    pub sync: Arc<dyn SyncTrigger>,
    pub status: Arc<dyn StatusSource>,
}

// ---------------------------------------------------------------------------
// Narrator
// ---------------------------------------------------------------------------

/// A sink bound to the thread of one run.
#[derive(Clone)]
pub struct Narrator {
    sink: Arc<dyn NotificationSink>,
    thread: ThreadRef,
}

impl Narrator {
    pub fn new(sink: Arc<dyn NotificationSink>, thread: ThreadRef) -> Self {
        Self { sink, thread }
    }

    pub async fn say(&self, text: &str) {
        tracing::debug!(channel = %self.thread.channel, "{text}");
        self.sink.send(&self.thread, text).await;
    }
}

/// Sink for runs nobody is watching in chat; narration goes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, thread: &ThreadRef, text: &str) {
        tracing::info!(channel = %thread.channel, "{text}");
    }
}
