//! GitHub REST client: pull requests, branch heads, check runs, and the
//! contents API used to read and commit the values file.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use deploybot_core::collab::{CollabResult, SourceControl};
use deploybot_core::config::GithubConfig;
use deploybot_core::types::{CommitInfo, ManifestFile, PullRequest};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::http::{decode_json, ensure_success};
use crate::{ClientError, Result};

const SERVICE: &str = "GitHub";

// ─── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PullRequestBody {
    number: u64,
    html_url: String,
    head: HeadBody,
}

#[derive(Debug, Deserialize)]
struct HeadBody {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CheckRunsBody {
    total_count: u64,
    check_runs: Vec<CheckRun>,
}

#[derive(Debug, Deserialize)]
struct CheckRun {
    name: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ContentBody {
    sha: String,
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutContentBody {
    commit: PutCommit,
}

#[derive(Debug, Deserialize)]
struct PutCommit {
    sha: String,
    html_url: String,
}

const CHECK_PAGE_SIZE: u32 = 100;
/// Commits with more check runs than this many pages are treated as pending.
const MAX_CHECK_PAGES: u32 = 10;

// ─── GithubClient ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GithubClient {
    http: Client,
    config: GithubConfig,
    token: String,
}

impl GithubClient {
    pub fn new(http: Client, config: GithubConfig, token: impl Into<String>) -> Self {
        Self {
            http,
            config,
            token: token.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.config.api_url.trim_end_matches('/'));
        debug!(%method, %url, "github request");
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.request(Method::GET, path).send().await?;
        decode_json(SERVICE, ensure_success(SERVICE, resp).await?).await
    }

    pub async fn get_pull_request(&self, app: &str, number: u64) -> Result<Option<PullRequest>> {
        let path = format!("/repos/{}/{app}/pulls/{number}", self.config.owner);
        let resp = self.request(Method::GET, &path).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: PullRequestBody = decode_json(SERVICE, ensure_success(SERVICE, resp).await?).await?;
        Ok(Some(PullRequest {
            number: body.number,
            html_url: body.html_url,
            head_sha: body.head.sha,
        }))
    }

    pub async fn get_branch_head(&self, app: &str, branch: &str) -> Result<String> {
        let path = format!("/repos/{}/{app}/commits/{branch}", self.config.owner);
        let body: CommitBody = self.get_json(&path).await?;
        Ok(body.sha)
    }

    /// True when the commit has at least one check run and all of them have
    /// reached `completed`, whatever their conclusion.
    ///
    /// Pages through the runs until `total_count` have been seen; the first
    /// unfinished run settles the answer.
    pub async fn get_checks_completed(&self, app: &str, sha: &str) -> Result<bool> {
        let mut seen: u64 = 0;
        let mut total: u64 = 0;
        for page in 1..=MAX_CHECK_PAGES {
            let path = format!(
                "/repos/{}/{app}/commits/{sha}/check-runs?per_page={CHECK_PAGE_SIZE}&page={page}",
                self.config.owner
            );
            let body: CheckRunsBody = self.get_json(&path).await?;
            total = body.total_count;
            if let Some(run) = body.check_runs.iter().find(|run| run.status != "completed") {
                debug!(app, sha, total, page, pending = %run.name, "check runs");
                return Ok(false);
            }
            seen += body.check_runs.len() as u64;
            if body.check_runs.is_empty() || seen >= total {
                break;
            }
        }
        debug!(app, sha, total, seen, "check runs");
        Ok(total > 0 && seen >= total)
    }

    pub async fn get_manifest(&self, app: &str) -> Result<ManifestFile> {
        let file_path = self.config.manifest_path_for(app);
        let path = format!(
            "/repos/{}/{}/contents/{file_path}?ref={}",
            self.config.owner, self.config.manifest_repo, self.config.manifest_branch
        );
        let body: ContentBody = self.get_json(&path).await?;
        if let Some(encoding) = body.encoding.as_deref() {
            if encoding != "base64" {
                return Err(ClientError::Decode {
                    service: SERVICE,
                    reason: format!("unsupported content encoding '{encoding}'"),
                });
            }
        }
        let packed: String = body.content.split_whitespace().collect();
        let bytes = STANDARD.decode(packed).map_err(|e| ClientError::Decode {
            service: SERVICE,
            reason: format!("content is not base64: {e}"),
        })?;
        let content = String::from_utf8(bytes).map_err(|e| ClientError::Decode {
            service: SERVICE,
            reason: format!("{file_path} is not UTF-8: {e}"),
        })?;
        Ok(ManifestFile {
            repository: self.config.manifest_repo.clone(),
            path: file_path,
            branch: self.config.manifest_branch.clone(),
            content,
            blob_sha: body.sha,
        })
    }

    pub async fn put_manifest(
        &self,
        file: &ManifestFile,
        content: &str,
        message: &str,
    ) -> Result<CommitInfo> {
        let path = format!(
            "/repos/{}/{}/contents/{}",
            self.config.owner, file.repository, file.path
        );
        let payload = serde_json::json!({
            "message": message,
            "content": STANDARD.encode(content.as_bytes()),
            "sha": file.blob_sha,
            "branch": file.branch,
        });
        let resp = self.request(Method::PUT, &path).json(&payload).send().await?;
        let body: PutContentBody = decode_json(SERVICE, ensure_success(SERVICE, resp).await?).await?;
        Ok(CommitInfo {
            sha: body.commit.sha,
            html_url: body.commit.html_url,
        })
    }
}

#[async_trait]
impl SourceControl for GithubClient {
    async fn pull_request(&self, app: &str, number: u64) -> CollabResult<Option<PullRequest>> {
        Ok(self.get_pull_request(app, number).await?)
    }

    async fn branch_head(&self, app: &str, branch: &str) -> CollabResult<String> {
        Ok(self.get_branch_head(app, branch).await?)
    }

    async fn checks_completed(&self, app: &str, commit_sha: &str) -> CollabResult<bool> {
        Ok(self.get_checks_completed(app, commit_sha).await?)
    }

    async fn download_manifest(&self, app: &str) -> CollabResult<ManifestFile> {
        Ok(self.get_manifest(app).await?)
    }

    async fn commit_manifest(
        &self,
        file: &ManifestFile,
        content: &str,
        message: &str,
    ) -> CollabResult<CommitInfo> {
        Ok(self.put_manifest(file, content, message).await?)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::build_http_client;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    fn client(url: &str) -> GithubClient {
        let config = GithubConfig {
            api_url: url.to_string(),
            owner: "acme".to_string(),
            ..GithubConfig::default()
        };
        let http = build_http_client(Duration::from_secs(5), false).unwrap();
        GithubClient::new(http, config, "ghp_test")
    }

    #[tokio::test]
    async fn pull_request_found() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/checkout/pulls/42")
            .match_header("authorization", "Bearer ghp_test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"number":42,"html_url":"https://github.com/acme/checkout/pull/42","head":{"sha":"abc123"}}"#,
            )
            .create_async()
            .await;

        let pr = client(&server.url())
            .get_pull_request("checkout", 42)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pr.head_sha, "abc123");
        assert_eq!(pr.html_url, "https://github.com/acme/checkout/pull/42");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn pull_request_missing_is_none() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/checkout/pulls/7")
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;
        let pr = client(&server.url()).get_pull_request("checkout", 7).await.unwrap();
        assert!(pr.is_none());
    }

    #[tokio::test]
    async fn server_error_is_a_status_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/checkout/pulls/7")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;
        let err = client(&server.url())
            .get_pull_request("checkout", 7)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn branch_head_returns_sha() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/checkout/commits/main")
            .with_status(200)
            .with_body(r#"{"sha":"feedface"}"#)
            .create_async()
            .await;
        let sha = client(&server.url())
            .get_branch_head("checkout", "main")
            .await
            .unwrap();
        assert_eq!(sha, "feedface");
    }

    #[tokio::test]
    async fn checks_completed_requires_every_run_finished() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/checkout/commits/abc/check-runs")
            .match_query(Matcher::UrlEncoded("per_page".into(), "100".into()))
            .with_status(200)
            .with_body(
                r#"{"total_count":2,"check_runs":[
                    {"name":"build","status":"completed","conclusion":"success"},
                    {"name":"push-image","status":"in_progress","conclusion":null}]}"#,
            )
            .create_async()
            .await;
        let done = client(&server.url())
            .get_checks_completed("checkout", "abc")
            .await
            .unwrap();
        assert!(!done);
    }

    #[tokio::test]
    async fn checks_completed_when_all_finished() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/checkout/commits/abc/check-runs")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"total_count":1,"check_runs":[{"name":"build","status":"completed","conclusion":"success"}]}"#,
            )
            .create_async()
            .await;
        assert!(client(&server.url())
            .get_checks_completed("checkout", "abc")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn checks_on_later_pages_are_consulted() {
        let mut server = Server::new_async().await;
        let finished: Vec<_> = (0..100)
            .map(|i| serde_json::json!({"name": format!("job-{i}"), "status": "completed"}))
            .collect();
        server
            .mock("GET", "/repos/acme/checkout/commits/abc/check-runs")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(serde_json::json!({"total_count": 101, "check_runs": finished}).to_string())
            .create_async()
            .await;
        let second = server
            .mock("GET", "/repos/acme/checkout/commits/abc/check-runs")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(
                r#"{"total_count":101,"check_runs":[{"name":"deploy-preview","status":"queued"}]}"#,
            )
            .create_async()
            .await;

        let done = client(&server.url())
            .get_checks_completed("checkout", "abc")
            .await
            .unwrap();
        assert!(!done);
        second.assert_async().await;
    }

    #[tokio::test]
    async fn short_page_with_larger_total_is_not_completed() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/checkout/commits/abc/check-runs")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(
                r#"{"total_count":3,"check_runs":[{"name":"build","status":"completed"}]}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/checkout/commits/abc/check-runs")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(r#"{"total_count":3,"check_runs":[]}"#)
            .create_async()
            .await;
        assert!(!client(&server.url())
            .get_checks_completed("checkout", "abc")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn no_check_runs_is_not_completed() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/checkout/commits/abc/check-runs")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"total_count":0,"check_runs":[]}"#)
            .create_async()
            .await;
        assert!(!client(&server.url())
            .get_checks_completed("checkout", "abc")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn manifest_download_decodes_wrapped_base64() {
        let mut server = Server::new_async().await;
        let encoded = STANDARD.encode("image:\n  tag: old\n");
        let (a, b) = encoded.split_at(8);
        let body = serde_json::json!({
            "sha": "blob123",
            "encoding": "base64",
            "content": format!("{a}\n{b}\n"),
        });
        server
            .mock("GET", "/repos/acme/deployments/contents/checkout/values.yaml")
            .match_query(Matcher::UrlEncoded("ref".into(), "main".into()))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let file = client(&server.url()).get_manifest("checkout").await.unwrap();
        assert_eq!(file.content, "image:\n  tag: old\n");
        assert_eq!(file.blob_sha, "blob123");
        assert_eq!(file.path, "checkout/values.yaml");
        assert_eq!(file.repository, "deployments");
    }

    #[tokio::test]
    async fn manifest_commit_sends_blob_sha_and_branch() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/repos/acme/deployments/contents/checkout/values.yaml")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "message": "Deploy checkout:abc1234",
                "content": STANDARD.encode("image:\n  tag: abc1234\n"),
                "sha": "blob123",
                "branch": "main",
            })))
            .with_status(200)
            .with_body(
                r#"{"commit":{"sha":"c0ffee","html_url":"https://github.com/acme/deployments/commit/c0ffee"}}"#,
            )
            .create_async()
            .await;

        let file = ManifestFile {
            repository: "deployments".into(),
            path: "checkout/values.yaml".into(),
            branch: "main".into(),
            content: "image:\n  tag: old\n".into(),
            blob_sha: "blob123".into(),
        };
        let commit = client(&server.url())
            .put_manifest(&file, "image:\n  tag: abc1234\n", "Deploy checkout:abc1234")
            .await
            .unwrap();
        assert_eq!(commit.sha, "c0ffee");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn conflicting_commit_surfaces_as_collaborator_error() {
        let mut server = Server::new_async().await;
        server
            .mock("PUT", "/repos/acme/deployments/contents/checkout/values.yaml")
            .with_status(409)
            .with_body(r#"{"message":"is at abc but expected def"}"#)
            .create_async()
            .await;
        let file = ManifestFile {
            repository: "deployments".into(),
            path: "checkout/values.yaml".into(),
            branch: "main".into(),
            content: String::new(),
            blob_sha: "def".into(),
        };
        let err = client(&server.url())
            .commit_manifest(&file, "x", "Deploy")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("409"));
    }
}
