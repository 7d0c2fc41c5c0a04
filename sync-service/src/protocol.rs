//! Result shapes handed to callers of the service.
//!
//! Failures cross the boundary as `{ "success": false, "error": "...",
//! "needsAuth": true }`; `needsAuth` is present only for credential
//! failures so callers can re-prompt.

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Outcome of `sync_all` / `sync_selected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Remote prompts taken into account for the cache.
    pub synced_prompts: usize,
    /// Cached prompts dropped because the remote no longer has them.
    pub deleted_prompts: usize,
    /// Category list of the cache after the sync.
    pub categories: Vec<String>,
}

/// Outcome of a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    pub merge_request_url: String,
    /// Number of prompts handed to push, regardless of deduplication.
    pub pushed_prompts: usize,
    /// Prompts the merged document gained over the remote one.
    pub new_prompts: usize,
    /// Pushed prompts that were already on the remote.
    pub updated_prompts: usize,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedCategory {
    pub category: String,
    pub removed_prompts: usize,
}

/// Envelope printed by the binary for every command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_auth: Option<bool>,
}

impl<T> ServiceResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            needs_auth: None,
        }
    }

    pub fn failure(err: &SyncError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            needs_auth: err.needs_auth().then_some(true),
        }
    }
}

impl<T> From<Result<T, SyncError>> for ServiceResponse<T> {
    fn from(result: Result<T, SyncError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failure(&err),
        }
    }
}
