//! Existence checks against an OCI distribution registry (ECR speaks the
//! same `/v2/` API).

use async_trait::async_trait;
use deploybot_core::collab::{ArtifactRegistry, CollabResult};
use deploybot_core::types::ArtifactIdentifier;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::http::ensure_success;
use crate::Result;

const SERVICE: &str = "registry";

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
application/vnd.oci.image.manifest.v1+json, \
application/vnd.docker.distribution.manifest.list.v2+json, \
application/vnd.docker.distribution.manifest.v2+json";

#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: Client,
    base_url: String,
    /// Full `Authorization` header value, e.g. `Basic ...` for ECR.
    auth: Option<String>,
}

impl RegistryClient {
    pub fn new(http: Client, base_url: impl Into<String>, auth: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    pub async fn manifest_exists(&self, repository: &str, tag: &str) -> Result<bool> {
        let url = format!("{}/v2/{repository}/manifests/{tag}", self.base_url);
        let mut req = self.http.head(&url).header("Accept", MANIFEST_ACCEPT);
        if let Some(auth) = &self.auth {
            req = req.header("Authorization", auth);
        }
        let resp = req.send().await?;
        debug!(%url, status = resp.status().as_u16(), "registry manifest probe");
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(SERVICE, resp).await?;
        Ok(true)
    }
}

#[async_trait]
impl ArtifactRegistry for RegistryClient {
    async fn image_exists(&self, artifact: &ArtifactIdentifier) -> CollabResult<bool> {
        Ok(self
            .manifest_exists(&artifact.repository, &artifact.tag)
            .await?)
    }
}
