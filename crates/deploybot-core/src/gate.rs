use crate::collab::{ArtifactRegistry, CollabResult, SourceControl};
use crate::config::{DeployConfig, RegistryConfig};
use crate::types::ArtifactIdentifier;
use std::sync::Arc;

/// Answers "is the image for this commit ready to deploy?".
///
/// Existence is a registry lookup; promotion is the commit's CI check runs
/// having all finished.
#[derive(Clone)]
pub struct ArtifactGate {
    registry: Arc<dyn ArtifactRegistry>,
    scm: Arc<dyn SourceControl>,
    registry_config: RegistryConfig,
    tag_length: usize,
}

impl ArtifactGate {
    pub fn new(
        registry: Arc<dyn ArtifactRegistry>,
        scm: Arc<dyn SourceControl>,
        config: &DeployConfig,
    ) -> Self {
        Self {
            registry,
            scm,
            registry_config: config.registry.clone(),
            tag_length: config.artifact.tag_length,
        }
    }

    pub fn identify(&self, app: &str, commit_sha: &str) -> ArtifactIdentifier {
        ArtifactIdentifier::from_commit(
            self.registry_config.repository_for(app),
            commit_sha,
            self.tag_length,
        )
    }

    pub async fn exists(
        &self,
        app: &str,
        commit_sha: &str,
    ) -> CollabResult<(ArtifactIdentifier, bool)> {
        let artifact = self.identify(app, commit_sha);
        let exists = self.registry.image_exists(&artifact).await?;
        Ok((artifact, exists))
    }

    pub async fn checks_completed(&self, app: &str, commit_sha: &str) -> CollabResult<bool> {
        self.scm.checks_completed(app, commit_sha).await
    }
}
