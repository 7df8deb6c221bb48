//! Drives one deployment request from chat mention to rolled-out application.
//!
//! ```text
//! resolve ref ─▶ image exists ─▶ checks done ─▶ mutate manifest ─▶ commit ─▶ sync + reconcile
//! ```
//!
//! Each stage narrates once before the next one starts. The first failing
//! stage narrates its error and ends the run; nothing is retried.

use crate::collab::{Collaborators, Narrator};
use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::gate::ArtifactGate;
use crate::manifest::ManifestMutator;
use crate::reconciler::{PollTally, StatusReconciler, Verdict};
use crate::types::{ArtifactIdentifier, DeploymentRequest, RefSpec};
use tracing::{info, warn};

/// Terminal outcome of one orchestration run.
#[derive(Debug)]
pub enum RunOutcome {
    /// The application converged.
    Deployed {
        artifact: ArtifactIdentifier,
        tally: PollTally,
    },
    /// Committed and synced, but the rollout was not confirmed within the
    /// polling budget. The operator was told to investigate.
    GaveUp {
        artifact: ArtifactIdentifier,
        tally: PollTally,
    },
    Failed(DeployError),
}

impl RunOutcome {
    pub fn is_deployed(&self) -> bool {
        matches!(self, RunOutcome::Deployed { .. })
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    collab: Collaborators,
    gate: ArtifactGate,
    mutator: ManifestMutator,
    reconciler: StatusReconciler,
    main_branch: String,
}

impl Orchestrator {
    pub fn new(config: &DeployConfig, collab: Collaborators) -> Self {
        let gate = ArtifactGate::new(collab.registry.clone(), collab.scm.clone(), config);
        let reconciler = StatusReconciler::new(collab.status.clone(), config.polling.settings());
        Self {
            gate,
            reconciler,
            mutator: ManifestMutator::new(&config.manifest.tag_path),
            main_branch: config.github.main_branch.clone(),
            collab,
        }
    }

    /// Replace the polling component, e.g. to shorten timings.
    pub fn with_reconciler(mut self, reconciler: StatusReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn reconciler(&self) -> &StatusReconciler {
        &self.reconciler
    }

    pub async fn run(&self, request: &DeploymentRequest, narrator: &Narrator) -> RunOutcome {
        info!(app = %request.application, reference = %request.reference, "deployment run started");
        match self.drive(request, narrator).await {
            Ok(outcome) => {
                info!(app = %request.application, deployed = outcome.is_deployed(), "deployment run finished");
                outcome
            }
            Err(err) => {
                warn!(app = %request.application, error = %err, "deployment run failed");
                narrator.say(&err.narration()).await;
                RunOutcome::Failed(err)
            }
        }
    }

    async fn drive(&self, request: &DeploymentRequest, narrator: &Narrator) -> Result<RunOutcome> {
        let app = request.application.as_str();

        // 1. Resolve the reference to a commit.
        let commit_sha = self.resolve(request, narrator).await?;

        // 2. The image for that commit must already be in the registry.
        let (artifact, exists) =
            self.gate
                .exists(app, &commit_sha)
                .await
                .map_err(|e| DeployError::Collaborator {
                    stage: "registry lookup",
                    reason: e.to_string(),
                })?;
        if !exists {
            return Err(DeployError::ArtifactNotFound {
                image: artifact.to_string(),
            });
        }
        narrator.say(&format!("_Found `{artifact}` in ECR_")).await;

        // 3. CI must have finished promoting it.
        let completed = self
            .gate
            .checks_completed(app, &commit_sha)
            .await
            .map_err(|e| DeployError::Collaborator {
                stage: "check run lookup",
                reason: e.to_string(),
            })?;
        if !completed {
            return Err(DeployError::ChecksIncomplete {
                image: artifact.to_string(),
            });
        }
        narrator
            .say(&format!("_Checks completed for `{}`_", artifact.tag))
            .await;

        // 4. Point the manifest at the new tag.
        let file = self
            .collab
            .scm
            .download_manifest(app)
            .await
            .map_err(|e| DeployError::DownloadFailed(e.to_string()))?;
        let mutation = self.mutator.apply(&file.path, &file.content, &artifact.tag)?;
        narrator.say(&mutation.message).await;

        // 5. Commit it.
        let commit_message = format!("Deploy {artifact}");
        let commit = self
            .collab
            .scm
            .commit_manifest(&file, &mutation.mutated, &commit_message)
            .await
            .map_err(|e| DeployError::CommitFailed(e.to_string()))?;
        narrator
            .say(&format!("_Deploying `{artifact}`: {}_", commit.html_url))
            .await;

        // 6. Sync and wait for the rollout.
        self.collab
            .sync
            .sync(app)
            .await
            .map_err(|e| DeployError::SyncTriggerFailed {
                app: app.to_string(),
                reason: e.to_string(),
            })?;
        narrator.say(&format!("_`{app}` sync underway_")).await;

        let outcome = self.reconciler.reconcile(app, narrator).await;
        Ok(match outcome.verdict {
            Verdict::Success => RunOutcome::Deployed {
                artifact,
                tally: outcome.tally,
            },
            Verdict::GiveUp | Verdict::Continue => RunOutcome::GaveUp {
                artifact,
                tally: outcome.tally,
            },
        })
    }

    async fn resolve(&self, request: &DeploymentRequest, narrator: &Narrator) -> Result<String> {
        let app = request.application.as_str();
        let lookup_failed = |e: crate::collab::CollaboratorError| DeployError::Collaborator {
            stage: "reference lookup",
            reason: e.to_string(),
        };

        match RefSpec::parse(&request.reference) {
            Some(RefSpec::PullRequest(number)) => {
                let pr = self
                    .collab
                    .scm
                    .pull_request(app, number)
                    .await
                    .map_err(lookup_failed)?
                    .ok_or_else(|| DeployError::PullRequestNotFound {
                        app: app.to_string(),
                        number,
                    })?;
                narrator.say(&format!("_Fetching {}_", pr.html_url)).await;
                Ok(pr.head_sha)
            }
            Some(RefSpec::MainBranch) => {
                let sha = self
                    .collab
                    .scm
                    .branch_head(app, &self.main_branch)
                    .await
                    .map_err(lookup_failed)?;
                narrator
                    .say(&format!("_Fetching `{}` for {app} app_", request.reference))
                    .await;
                Ok(sha)
            }
            None => Err(DeployError::InvalidRequest(format!(
                "`{}` is not a pull request number or `main`",
                request.reference
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
