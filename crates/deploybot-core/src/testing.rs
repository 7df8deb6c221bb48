//! In-memory collaborators that record every call.
//!
//! Compiled for this crate's tests and, through the `testing` feature, for
//! the tests of downstream crates.

use crate::collab::{
    ArtifactRegistry, CollabResult, CollaboratorError, Collaborators, NotificationSink,
    SourceControl, StatusSource, SyncTrigger, WebhookForwarder,
};
use crate::types::{
    ArtifactIdentifier, CommitInfo, ManifestFile, PullRequest, ResourceStatus, ThreadRef,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub const DEFAULT_VALUES: &str = "image:\n  repository: registry.test/app\n  tag: 0000000\n";
pub const MAIN_HEAD_SHA: &str = "feedfacecafe0001";

// ---------------------------------------------------------------------------
// CallLog
// ---------------------------------------------------------------------------

/// Ordered record of collaborator calls, shareable across fakes.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, call: impl Into<String>) {
        lock(&self.0).push(call.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    /// Calls whose name starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        lock(&self.0).iter().filter(|c| c.starts_with(prefix)).count()
    }
}

// ---------------------------------------------------------------------------
// FakeScm
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FakeScm {
    log: CallLog,
    pull_requests: HashMap<u64, PullRequest>,
    branch_heads: HashMap<String, String>,
    checks_done: bool,
    manifest: Option<String>,
    commit_error: Option<String>,
    lookup_error: Option<String>,
    commits: Arc<Mutex<Vec<String>>>,
}

impl Default for FakeScm {
    fn default() -> Self {
        Self {
            log: CallLog::default(),
            pull_requests: HashMap::new(),
            branch_heads: HashMap::from([("main".to_string(), MAIN_HEAD_SHA.to_string())]),
            checks_done: true,
            manifest: Some(DEFAULT_VALUES.to_string()),
            commit_error: None,
            lookup_error: None,
            commits: Arc::default(),
        }
    }
}

impl FakeScm {
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_pull_request(mut self, number: u64, head_sha: &str) -> Self {
        self.pull_requests.insert(
            number,
            PullRequest {
                number,
                html_url: format!("https://github.test/acme/app/pull/{number}"),
                head_sha: head_sha.to_string(),
            },
        );
        self
    }

    pub fn checks_pending(mut self) -> Self {
        self.checks_done = false;
        self
    }

    pub fn with_manifest(mut self, content: &str) -> Self {
        self.manifest = Some(content.to_string());
        self
    }

    pub fn manifest_missing(mut self) -> Self {
        self.manifest = None;
        self
    }

    pub fn commit_fails(mut self, reason: &str) -> Self {
        self.commit_error = Some(reason.to_string());
        self
    }

    pub fn lookups_fail(mut self, reason: &str) -> Self {
        self.lookup_error = Some(reason.to_string());
        self
    }

    pub fn calls(&self) -> CallLog {
        self.log.clone()
    }

    /// Handle to the contents committed so far.
    pub fn commits(&self) -> Arc<Mutex<Vec<String>>> {
        self.commits.clone()
    }

    fn lookup_guard(&self) -> CollabResult<()> {
        match &self.lookup_error {
            Some(reason) => Err(CollaboratorError::new(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SourceControl for FakeScm {
    async fn pull_request(&self, app: &str, number: u64) -> CollabResult<Option<PullRequest>> {
        self.log.record(format!("pull_request:{app}#{number}"));
        self.lookup_guard()?;
        Ok(self.pull_requests.get(&number).cloned())
    }

    async fn branch_head(&self, app: &str, branch: &str) -> CollabResult<String> {
        self.log.record(format!("branch_head:{app}@{branch}"));
        self.lookup_guard()?;
        self.branch_heads
            .get(branch)
            .cloned()
            .ok_or_else(|| CollaboratorError::new(format!("branch {branch} not found")))
    }

    async fn checks_completed(&self, app: &str, commit_sha: &str) -> CollabResult<bool> {
        self.log.record(format!("checks_completed:{app}@{commit_sha}"));
        Ok(self.checks_done)
    }

    async fn download_manifest(&self, app: &str) -> CollabResult<ManifestFile> {
        self.log.record(format!("download_manifest:{app}"));
        let content = self
            .manifest
            .clone()
            .ok_or_else(|| CollaboratorError::new("404 Not Found"))?;
        Ok(ManifestFile {
            repository: "deployments".to_string(),
            path: format!("{app}/values.yaml"),
            branch: "main".to_string(),
            content,
            blob_sha: "blob0001".to_string(),
        })
    }

    async fn commit_manifest(
        &self,
        file: &ManifestFile,
        content: &str,
        message: &str,
    ) -> CollabResult<CommitInfo> {
        self.log.record(format!("commit_manifest:{}:{message}", file.path));
        if let Some(reason) = &self.commit_error {
            return Err(CollaboratorError::new(reason.clone()));
        }
        lock(&self.commits).push(content.to_string());
        Ok(CommitInfo {
            sha: "c0ffee0001".to_string(),
            html_url: "https://github.test/acme/deployments/commit/c0ffee0001".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// FakeRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct FakeRegistry {
    log: CallLog,
    images: HashSet<String>,
    error: Option<String>,
}

impl FakeRegistry {
    /// Images as `repository:tag`.
    pub fn with_images<'a>(images: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            images: images.into_iter().map(str::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn failing(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }

    pub fn calls(&self) -> CallLog {
        self.log.clone()
    }
}

#[async_trait]
impl ArtifactRegistry for FakeRegistry {
    async fn image_exists(&self, artifact: &ArtifactIdentifier) -> CollabResult<bool> {
        self.log.record(format!("image_exists:{artifact}"));
        if let Some(reason) = &self.error {
            return Err(CollaboratorError::new(reason.clone()));
        }
        Ok(self.images.contains(&artifact.to_string()))
    }
}

// ---------------------------------------------------------------------------
// FakeSync / FakeForwarder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct FakeSync {
    log: CallLog,
    error: Option<String>,
}

impl FakeSync {
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn failing(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }

    pub fn calls(&self) -> CallLog {
        self.log.clone()
    }
}

#[async_trait]
impl SyncTrigger for FakeSync {
    async fn sync(&self, app: &str) -> CollabResult<()> {
        self.log.record(format!("sync:{app}"));
        match &self.error {
            Some(reason) => Err(CollaboratorError::new(reason.clone())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeForwarder {
    log: CallLog,
    error: Option<String>,
}

impl FakeForwarder {
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn failing(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }

    pub fn calls(&self) -> CallLog {
        self.log.clone()
    }
}

#[async_trait]
impl WebhookForwarder for FakeForwarder {
    async fn forward(&self, event: &str, payload: &[u8]) -> CollabResult<()> {
        self.log.record(format!("forward:{event}:{}", payload.len()));
        match &self.error {
            Some(reason) => Err(CollaboratorError::new(reason.clone())),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedStatus
// ---------------------------------------------------------------------------

/// Replays poll results in order; an exhausted script reports no resources.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStatus {
    log: CallLog,
    script: Arc<Mutex<VecDeque<Result<Vec<ResourceStatus>, String>>>>,
}

impl ScriptedStatus {
    pub fn new(script: Vec<Result<Vec<ResourceStatus>, String>>) -> Self {
        Self {
            log: CallLog::default(),
            script: Arc::new(Mutex::new(script.into())),
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn calls(&self) -> CallLog {
        self.log.clone()
    }
}

#[async_trait]
impl StatusSource for ScriptedStatus {
    async fn poll(&self, app: &str) -> CollabResult<Vec<ResourceStatus>> {
        self.log.record(format!("poll:{app}"));
        match lock(&self.script).pop_front() {
            Some(Ok(statuses)) => Ok(statuses),
            Some(Err(reason)) => Err(CollaboratorError::new(reason)),
            None => Ok(Vec::new()),
        }
    }

    fn status_url(&self, app: &str) -> String {
        format!("https://argocd.test/applications/{app}")
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(ThreadRef, String)>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<(ThreadRef, String)> {
        lock(&self.sent).clone()
    }

    pub fn texts(&self) -> Vec<String> {
        lock(&self.sent).iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, thread: &ThreadRef, text: &str) {
        lock(&self.sent).push((thread.clone(), text.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Bundles
// ---------------------------------------------------------------------------

pub fn collaborators(
    scm: FakeScm,
    registry: FakeRegistry,
    sync: FakeSync,
    status: ScriptedStatus,
) -> Collaborators {
    Collaborators {
        scm: Arc::new(scm),
        registry: Arc::new(registry),
        sync: Arc::new(sync),
        status: Arc::new(status),
    }
}
