//! Errors surfaced by the reconciliation service.

use std::fmt;

use promptsync_backend_client::ApiError;
use promptsync_core::{CodecError, LocalStoreError, StoreError};
use promptsync_keyring_store::TokenStoreError;

use crate::config::ConfigError;

/// Stage of the push pipeline, used to label the furthest step reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStep {
    FetchRemote,
    Encode,
    CreateBranch,
    CommitFile,
    OpenMergeRequest,
}

impl PushStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushStep::FetchRemote => "Failed to fetch remote state",
            PushStep::Encode => "Failed to encode prompts",
            PushStep::CreateBranch => "Failed to create branch",
            PushStep::CommitFile => "Failed to commit prompts",
            PushStep::OpenMergeRequest => "Failed to create merge request",
        }
    }
}

impl fmt::Display for PushStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// No token is stored or the remote rejected it.
    #[error("Authentication required: store a valid API token")]
    NeedsAuth,

    /// Remote document is not valid JSON of the expected shape.
    #[error("Invalid remote document: {0}")]
    Validation(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("No prompts selected to push")]
    EmptyPush,

    #[error("{step}: {message}")]
    PushFailed { step: PushStep, message: String },

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Local(#[from] LocalStoreError),

    #[error("Token store error: {0}")]
    Token(#[from] TokenStoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Bad command-line input, such as an empty token.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Caller should ask for credentials before retrying.
    pub fn needs_auth(&self) -> bool {
        matches!(self, SyncError::NeedsAuth)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Api { status: 404, .. })
    }

    /// Wraps a failure from `step` of a push, keeping auth failures distinct.
    pub(crate) fn at_step(step: PushStep, err: SyncError) -> SyncError {
        match err {
            SyncError::NeedsAuth => SyncError::NeedsAuth,
            other => SyncError::PushFailed {
                step,
                message: other.to_string(),
            },
        }
    }
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        if err.is_auth() {
            return SyncError::NeedsAuth;
        }
        match err {
            ApiError::ApiResponse { status, message } => SyncError::Api {
                status,
                body: message,
            },
            ApiError::Network(e) => SyncError::Network(e.to_string()),
            ApiError::Parse(msg) => SyncError::Validation(msg),
            ApiError::InvalidConfig(msg) => SyncError::Config(ConfigError::Validation(msg)),
            ApiError::NotAuthenticated => SyncError::NeedsAuth,
        }
    }
}

impl From<CodecError> for SyncError {
    fn from(err: CodecError) -> Self {
        SyncError::Validation(err.to_string())
    }
}
