//! Remote transport for the shared prompt document.
//!
//! The remote is a hosted git repository reached over REST: read a file at
//! a ref, create a branch, commit a file to it and open a merge request.
//! [`RemoteRepository`] is the seam the sync service talks to;
//! [`GitLabClient`] implements it against the GitLab v4 API.

mod gitlab;

pub use gitlab::{GitLabClient, GitLabConfig};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Errors from remote API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No token was supplied or the remote answered 401.
    #[error("Not authenticated with the remote repository")]
    NotAuthenticated,

    /// Request never produced a response (DNS, TLS, timeout, reset).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Any other non-2xx response.
    #[error("API error ({status}): {message}")]
    ApiResponse {
        /// HTTP status code.
        status: u16,
        /// Response body as returned by the remote.
        message: String,
    },

    /// 2xx response whose body did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// Credentials are missing or were rejected.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ApiError::NotAuthenticated | ApiError::ApiResponse { status: 401, .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::ApiResponse { status: 404, .. })
    }
}

/// Result type for remote operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// File as returned by the repository files API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    /// Base64 payload.
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

/// Whether a commit creates the file or replaces an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitAction {
    Create,
    Update,
}

/// Single-file commit onto an existing branch.
#[derive(Debug, Clone)]
pub struct FileCommit {
    pub branch: String,
    pub file_path: String,
    /// Base64-encoded file content.
    pub content: String,
    pub commit_message: String,
    pub action: CommitAction,
}

/// Merge request to open. The source branch is always deleted on merge.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MergeRequestInfo {
    #[serde(default)]
    pub iid: u64,
    pub web_url: String,
}

/// Operations the sync service needs from the hosting platform.
///
/// Every call carries the bearer token explicitly.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    async fn fetch_file(&self, token: &str, file_path: &str, git_ref: &str)
    -> ApiResult<RemoteFile>;

    async fn create_branch(&self, token: &str, branch: &str, from_ref: &str) -> ApiResult<()>;

    async fn commit_file(&self, token: &str, commit: &FileCommit) -> ApiResult<()>;

    async fn create_merge_request(
        &self,
        token: &str,
        request: &MergeRequest,
    ) -> ApiResult<MergeRequestInfo>;
}
