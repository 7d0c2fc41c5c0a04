//! Publishing local prompts through a branch, a commit and a merge request.

use chrono::{DateTime, SecondsFormat, Utc};
use promptsync_backend_client::{CommitAction, FileCommit, MergeRequest};
use promptsync_core::{Prompt, codec, remove_duplicates};

use crate::error::{PushStep, SyncError};
use crate::protocol::PushReport;
use crate::service::{CloudSyncService, RemoteSnapshot};

const BRANCH_PREFIX: &str = "prompt-sync";

/// What a push will write and the counts reported for it.
#[derive(Debug, Clone)]
pub struct MergePlan {
    /// Prompts to encode, local entries first.
    pub prompts: Vec<Prompt>,
    pub new_count: usize,
    pub updated_count: usize,
}

/// Merges local prompts into the remote set.
///
/// Both sides get `alias = alias ?? label`. Counts come from the
/// identity-deduplicated `remote ++ local`. The document is encoded from
/// `local ++ remote`; encoding keeps the first entry per category and alias,
/// so a local prompt replaces a remote one that shares its alias.
pub fn plan_merge(remote: &[Prompt], local: &[Prompt]) -> MergePlan {
    let remote: Vec<Prompt> = remote.iter().map(Prompt::with_normalized_alias).collect();
    let local: Vec<Prompt> = local.iter().map(Prompt::with_normalized_alias).collect();

    let unique = remove_duplicates(remote.iter().chain(local.iter()).cloned().collect());
    let new_count = unique.len().saturating_sub(remote.len());
    let updated_count = local.len().saturating_sub(new_count);

    let mut prompts = local;
    prompts.extend(remote);
    MergePlan {
        prompts: remove_duplicates(prompts),
        new_count,
        updated_count,
    }
}

/// `prompt-sync-<timestamp>` with `:` and `.` replaced so the name is a
/// valid ref. Only unique to the second.
pub fn branch_name(now: DateTime<Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Secs, true)
        .replace([':', '.'], "-");
    format!("{BRANCH_PREFIX}-{stamp}")
}

pub fn commit_message(plan: &MergePlan) -> String {
    format!(
        "Sync prompts: {} new, {} updated",
        plan.new_count, plan.updated_count
    )
}

pub fn merge_request_title(categories: &[String]) -> String {
    if categories.is_empty() {
        "Prompt sync".to_string()
    } else {
        format!("Prompt sync: {}", categories.join(", "))
    }
}

pub fn merge_request_description(categories: &[String], plan: &MergePlan) -> String {
    let mut description = String::from("Prompt changes proposed from a local collection.\n\n");
    if !categories.is_empty() {
        description.push_str("Categories:\n");
        for category in categories {
            description.push_str(&format!("- {category}\n"));
        }
        description.push('\n');
    }
    description.push_str(&format!(
        "New prompts: {}\nUpdated prompts: {}\n",
        plan.new_count, plan.updated_count
    ));
    description
}

impl CloudSyncService {
    /// Proposes `prompts` as a merge request against the remote document.
    ///
    /// Each step aborts the push on failure. Branches or commits created
    /// before a failure are left on the remote. The cloud cache is not
    /// touched; a later sync picks the change up once it is merged.
    pub async fn push(
        &self,
        prompts: Vec<Prompt>,
        involved_categories: &[String],
    ) -> Result<PushReport, SyncError> {
        if prompts.is_empty() {
            return Err(SyncError::EmptyPush);
        }
        let token = self.require_token()?;

        let (remote, action) = match self.fetch_with_token(&token).await {
            Ok(RemoteSnapshot { prompts: remote, .. }) => (remote, CommitAction::Update),
            Err(err) if err.is_not_found() => {
                tracing::warn!(file = %self.target.file_path, "remote document missing, pushing a new one");
                (Vec::new(), CommitAction::Create)
            }
            Err(err) => return Err(SyncError::at_step(PushStep::FetchRemote, err)),
        };

        let plan = plan_merge(&remote, &prompts);
        let content = codec::serialize(&codec::encode(&plan.prompts))
            .map_err(|e| SyncError::at_step(PushStep::Encode, e.into()))?;

        let branch = branch_name(Utc::now());
        self.remote
            .create_branch(&token, &branch, &self.target.base_branch)
            .await
            .map_err(|e| SyncError::at_step(PushStep::CreateBranch, e.into()))?;

        let commit = FileCommit {
            branch: branch.clone(),
            file_path: self.target.file_path.clone(),
            content,
            commit_message: commit_message(&plan),
            action,
        };
        self.remote
            .commit_file(&token, &commit)
            .await
            .map_err(|e| SyncError::at_step(PushStep::CommitFile, e.into()))?;

        let request = MergeRequest {
            source_branch: branch.clone(),
            target_branch: self.target.target_branch.clone(),
            title: merge_request_title(involved_categories),
            description: merge_request_description(involved_categories, &plan),
        };
        let merge_request = self
            .remote
            .create_merge_request(&token, &request)
            .await
            .map_err(|e| SyncError::at_step(PushStep::OpenMergeRequest, e.into()))?;

        tracing::info!(
            %branch,
            url = %merge_request.web_url,
            new = plan.new_count,
            updated = plan.updated_count,
            "opened merge request"
        );
        Ok(PushReport {
            merge_request_url: merge_request.web_url,
            pushed_prompts: prompts.len(),
            new_prompts: plan.new_count,
            updated_prompts: plan.updated_count,
            branch,
        })
    }
}
