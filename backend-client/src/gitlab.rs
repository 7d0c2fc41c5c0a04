//! GitLab v4 REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::json;

use super::{
    ApiError, ApiResult, CommitAction, FileCommit, MergeRequest, MergeRequestInfo, RemoteFile,
    RemoteRepository,
};

/// Default API root for gitlab.com.
pub const DEFAULT_API_URL: &str = "https://gitlab.com/api/v4";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct GitLabConfig {
    /// API root, e.g. `https://gitlab.example.com/api/v4`.
    pub api_url: String,
    /// Numeric id or `namespace/project` path.
    pub project_id: String,
    /// Applied to every request; there is no retry.
    pub timeout: Duration,
}

impl GitLabConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            project_id: project_id.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// GitLab implementation of [`RemoteRepository`].
pub struct GitLabClient {
    client: reqwest::Client,
    config: GitLabConfig,
}

impl GitLabClient {
    pub fn new(config: GitLabConfig) -> ApiResult<Self> {
        if config.project_id.trim().is_empty() {
            return Err(ApiError::InvalidConfig("project id is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("promptsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn project_url(&self) -> String {
        format!(
            "{}/projects/{}",
            self.config.api_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.project_id)
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/repository/files/{}",
            self.project_url(),
            urlencoding::encode(file_path)
        )
    }

    fn headers(token: &str) -> ApiResult<HeaderMap> {
        if token.trim().is_empty() {
            return Err(ApiError::NotAuthenticated);
        }
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth_value = format!("Bearer {token}");
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value)
                .map_err(|_| ApiError::InvalidConfig("Invalid token".to_string()))?,
        );
        Ok(headers)
    }

    /// Maps non-2xx responses onto [`ApiError`].
    async fn check(response: reqwest::Response) -> ApiResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::NotAuthenticated);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ApiError::ApiResponse {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RemoteRepository for GitLabClient {
    async fn fetch_file(
        &self,
        token: &str,
        file_path: &str,
        git_ref: &str,
    ) -> ApiResult<RemoteFile> {
        let url = self.file_url(file_path);
        tracing::debug!(%url, git_ref, "fetching remote file");

        let response = self
            .client
            .get(&url)
            .headers(Self::headers(token)?)
            .query(&[("ref", git_ref)])
            .send()
            .await?;
        let response = Self::check(response).await?;

        let file: RemoteFile = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(format!("Failed to parse file response: {e}")))?;
        if let Some(encoding) = file.encoding.as_deref()
            && encoding != "base64"
        {
            return Err(ApiError::Parse(format!(
                "unsupported file encoding: {encoding}"
            )));
        }
        Ok(file)
    }

    async fn create_branch(&self, token: &str, branch: &str, from_ref: &str) -> ApiResult<()> {
        let url = format!("{}/repository/branches", self.project_url());
        tracing::debug!(%url, branch, from_ref, "creating branch");

        let response = self
            .client
            .post(&url)
            .headers(Self::headers(token)?)
            .json(&json!({ "branch": branch, "ref": from_ref }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn commit_file(&self, token: &str, commit: &FileCommit) -> ApiResult<()> {
        let url = self.file_url(&commit.file_path);
        tracing::debug!(%url, branch = %commit.branch, action = ?commit.action, "committing file");

        let body = json!({
            "branch": commit.branch,
            "content": commit.content,
            "encoding": "base64",
            "commit_message": commit.commit_message,
        });
        let request = match commit.action {
            CommitAction::Create => self.client.post(&url),
            CommitAction::Update => self.client.put(&url),
        };
        let response = request
            .headers(Self::headers(token)?)
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_merge_request(
        &self,
        token: &str,
        request: &MergeRequest,
    ) -> ApiResult<MergeRequestInfo> {
        let url = format!("{}/merge_requests", self.project_url());
        tracing::debug!(%url, source = %request.source_branch, "opening merge request");

        let body = json!({
            "source_branch": request.source_branch,
            "target_branch": request.target_branch,
            "title": request.title,
            "description": request.description,
            "remove_source_branch": true,
        });
        let response = self
            .client
            .post(&url)
            .headers(Self::headers(token)?)
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response).await?;

        response
            .json()
            .await
            .map_err(|e| ApiError::Parse(format!("Failed to parse merge request response: {e}")))
    }
}
