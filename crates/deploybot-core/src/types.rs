use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// DeploymentRequest
// ---------------------------------------------------------------------------

/// One accepted chat trigger: which application to deploy and from where.
///
/// `reference` is kept verbatim; stage 1 of the pipeline interprets it through
/// [`RefSpec::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub application: String,
    pub reference: String,
}

impl DeploymentRequest {
    pub fn new(application: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            reference: reference.into(),
        }
    }
}

/// Application names are repository names: lowercase letters, digits, `-`, `_`.
///
/// Names end up as path segments of registry, GitHub and Argo CD URLs, so
/// anything else is rejected before a collaborator sees it.
pub fn is_valid_application(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

// ---------------------------------------------------------------------------
// RefSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefSpec {
    PullRequest(u64),
    MainBranch,
}

impl RefSpec {
    pub const MAIN_BRANCH: &'static str = "main";

    /// A positive decimal number is a pull request; the literal `main` is the
    /// main branch. Anything else is rejected.
    pub fn parse(reference: &str) -> Option<Self> {
        if reference == Self::MAIN_BRANCH {
            return Some(RefSpec::MainBranch);
        }
        if reference.is_empty() || !reference.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        match reference.parse::<u64>() {
            Ok(0) | Err(_) => None,
            Ok(n) => Some(RefSpec::PullRequest(n)),
        }
    }
}

// ---------------------------------------------------------------------------
// ArtifactIdentifier
// ---------------------------------------------------------------------------

/// A container image built from one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactIdentifier {
    pub repository: String,
    pub tag: String,
    pub commit_sha: String,
}

impl ArtifactIdentifier {
    /// CI tags images with the leading `tag_length` characters of the commit SHA.
    pub fn from_commit(
        repository: impl Into<String>,
        commit_sha: impl Into<String>,
        tag_length: usize,
    ) -> Self {
        let commit_sha = commit_sha.into();
        let tag: String = commit_sha.chars().take(tag_length.max(1)).collect();
        Self {
            repository: repository.into(),
            tag,
            commit_sha,
        }
    }
}

impl fmt::Display for ArtifactIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

// ---------------------------------------------------------------------------
// ManifestMutation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestMutation {
    pub original: String,
    pub mutated: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// SyncState / ResourceStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncState {
    Unknown,
    OutOfSync,
    Progressing,
    Synced,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Unknown => "Unknown",
            SyncState::OutOfSync => "OutOfSync",
            SyncState::Progressing => "Progressing",
            SyncState::Synced => "Synced",
        }
    }

    /// Map the control plane's status string. Values this bot does not know
    /// about are reported as `Unknown`.
    pub fn from_status(raw: &str) -> Self {
        match raw {
            "Synced" => SyncState::Synced,
            "OutOfSync" => SyncState::OutOfSync,
            "Progressing" => SyncState::Progressing,
            _ => SyncState::Unknown,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One managed sub-resource as reported by a single poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub name: String,
    pub state: SyncState,
}

impl ResourceStatus {
    pub fn new(name: impl Into<String>, state: SyncState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }
}

// ---------------------------------------------------------------------------
// Source control records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
    pub head_sha: String,
}

/// A manifest file as downloaded, with the blob SHA needed to update it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    pub repository: String,
    pub path: String,
    pub branch: String,
    pub content: String,
    pub blob_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub html_url: String,
}

// ---------------------------------------------------------------------------
// ThreadRef
// ---------------------------------------------------------------------------

/// Where narration for one run is posted. Passed through to the sink untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadRef {
    pub channel: String,
    pub thread_ts: Option<String>,
}

impl ThreadRef {
    pub fn new(channel: impl Into<String>, thread_ts: Option<String>) -> Self {
        Self {
            channel: channel.into(),
            thread_ts,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
