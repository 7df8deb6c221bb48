use thiserror::Error;

/// Failures that end an orchestration run, plus the configuration errors
/// raised before any run starts.
///
/// Every pipeline variant renders to exactly one chat line through
/// [`DeployError::narration`].
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("pull request #{number} not found in {app}")]
    PullRequestNotFound { app: String, number: u64 },

    #[error("artifact not found: {image}")]
    ArtifactNotFound { image: String },

    #[error("checks still running for {image}")]
    ChecksIncomplete { image: String },

    #[error("manifest download failed: {0}")]
    DownloadFailed(String),

    #[error("field '{field}' not found in {file}")]
    MutationFieldMissing { field: String, file: String },

    #[error("manifest {file} is not valid YAML: {reason}")]
    ManifestInvalid { file: String, reason: String },

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("sync of {app} failed: {reason}")]
    SyncTriggerFailed { app: String, reason: String },

    #[error("status poll failed: {0}")]
    PollTransport(String),

    #[error("{stage} failed: {reason}")]
    Collaborator { stage: &'static str, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl DeployError {
    /// The chat line posted when this error ends a run.
    pub fn narration(&self) -> String {
        match self {
            DeployError::InvalidRequest(msg) => format!("_{msg}_"),
            DeployError::PullRequestNotFound { app, number } => {
                format!("_Error: pull request #{number} not found in `{app}`_")
            }
            DeployError::ArtifactNotFound { image } => {
                format!("_`{image}` does not exist in ECR_")
            }
            DeployError::ChecksIncomplete { image } => format!(
                "_`{image}` has not been promoted to ECR; GitHub Actions are still underway_"
            ),
            DeployError::DownloadFailed(reason) => {
                format!("_Error downloading manifest: {reason}_")
            }
            DeployError::MutationFieldMissing { field, file } => {
                format!("_Error: field `{field}` not found in `{file}`_")
            }
            DeployError::ManifestInvalid { file, reason } => {
                format!("_Error: `{file}` is not valid YAML: {reason}_")
            }
            DeployError::CommitFailed(reason) => format!("_Error committing manifest: {reason}_"),
            DeployError::SyncTriggerFailed { app, reason } => {
                format!("_Error syncing {app} in Argocd: `{reason}`_")
            }
            DeployError::PollTransport(reason) => {
                format!("_Error getting deployment status: `{reason}`_")
            }
            DeployError::Collaborator { stage, reason } => {
                format!("_Error during {stage}: {reason}_")
            }
            other => format!("_Error {other}_"),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
