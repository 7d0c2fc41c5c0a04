//! Cloud reconciliation service.
//!
//! Reads are all-or-nothing: the remote document is fetched and validated
//! before the cache is touched, so any failure leaves cached state as it
//! was. Cache-mutating operations hold the cache lock for their whole
//! duration, which serializes them per service instance.

use std::sync::Arc;

use promptsync_backend_client::RemoteRepository;
use promptsync_core::codec;
use promptsync_core::identity::{filter_out_duplicates, identity_key, identity_set};
use promptsync_core::model::now_millis;
use promptsync_core::{ChangeEvent, ChangeNotifier, Prompt, StateStore};
use promptsync_keyring_store::TokenStore;
use tokio::sync::{Mutex, broadcast};

use crate::cache::CloudCache;
use crate::config::RemoteConfig;
use crate::error::SyncError;
use crate::protocol::SyncReport;

/// Document location and branches used by fetch and push.
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub file_path: String,
    pub base_branch: String,
    pub target_branch: String,
}

impl From<&RemoteConfig> for RemoteTarget {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            file_path: config.file_path.clone(),
            base_branch: config.base_branch.clone(),
            target_branch: config.target_branch.clone(),
        }
    }
}

/// Decoded remote document.
#[derive(Debug, Clone)]
pub struct RemoteSnapshot {
    /// Flattened prompts with synthesized ids; `is_cloud` unset.
    pub prompts: Vec<Prompt>,
    /// Category keys of the document, including empty ones.
    pub categories: Vec<String>,
}

pub struct CloudSyncService {
    pub(crate) remote: Arc<dyn RemoteRepository>,
    pub(crate) tokens: Arc<dyn TokenStore>,
    pub(crate) target: RemoteTarget,
    cache: Mutex<CloudCache>,
    notifier: ChangeNotifier,
}

impl CloudSyncService {
    /// Loads the persisted cache from `state`.
    pub fn new(
        remote: Arc<dyn RemoteRepository>,
        tokens: Arc<dyn TokenStore>,
        target: RemoteTarget,
        state: Arc<dyn StateStore>,
        notifier: ChangeNotifier,
    ) -> Result<Self, SyncError> {
        let cache = CloudCache::load(state, notifier.clone())?;
        Ok(Self {
            remote,
            tokens,
            target,
            cache: Mutex::new(cache),
            notifier,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.notifier.subscribe()
    }

    pub fn has_token(&self) -> Result<bool, SyncError> {
        Ok(self.tokens.load()?.is_some())
    }

    pub fn set_token(&self, token: &str) -> Result<(), SyncError> {
        self.tokens.save(token.trim())?;
        Ok(())
    }

    pub fn clear_token(&self) -> Result<(), SyncError> {
        self.tokens.clear()?;
        Ok(())
    }

    pub async fn cloud_prompts(&self) -> Vec<Prompt> {
        self.cache.lock().await.prompts().to_vec()
    }

    pub async fn cloud_categories(&self) -> Vec<String> {
        self.cache.lock().await.categories().to_vec()
    }

    pub(crate) fn require_token(&self) -> Result<String, SyncError> {
        self.tokens.load()?.ok_or(SyncError::NeedsAuth)
    }

    /// Fetches and decodes the remote document. Never touches the cache.
    pub async fn fetch_and_parse(&self) -> Result<RemoteSnapshot, SyncError> {
        let token = self.require_token()?;
        self.fetch_with_token(&token).await
    }

    pub(crate) async fn fetch_with_token(&self, token: &str) -> Result<RemoteSnapshot, SyncError> {
        let file = self
            .remote
            .fetch_file(token, &self.target.file_path, &self.target.base_branch)
            .await?;
        let document = codec::decode(&file.content)?;
        let prompts = codec::to_prompts(&document, now_millis());
        tracing::debug!(
            prompts = prompts.len(),
            categories = document.category_names().len(),
            "decoded remote document"
        );
        Ok(RemoteSnapshot {
            prompts,
            categories: document.category_names(),
        })
    }

    /// Category keys of the current remote document.
    pub async fn remote_categories(&self) -> Result<Vec<String>, SyncError> {
        Ok(self.fetch_and_parse().await?.categories)
    }

    /// Replaces the whole cache with the remote document.
    pub async fn sync_all(&self) -> Result<SyncReport, SyncError> {
        let mut cache = self.cache.lock().await;
        let snapshot = self.fetch_and_parse().await?;

        let deleted_prompts = {
            let remote = identity_set(&snapshot.prompts);
            cache
                .prompts()
                .iter()
                .filter(|cached| !remote.contains(&identity_key(cached)))
                .count()
        };
        let prompts = mark_cloud(snapshot.prompts);
        let synced_prompts = prompts.len();
        cache.replace(prompts, snapshot.categories.clone())?;

        tracing::info!(synced_prompts, deleted_prompts, "synced all cloud prompts");
        Ok(SyncReport {
            synced_prompts,
            deleted_prompts,
            categories: snapshot.categories,
        })
    }

    /// Pulls the selected categories into the cache.
    ///
    /// Cached prompts survive when the remote still has an identical prompt
    /// in any category, selected or not; the rest count as deleted. Incoming
    /// prompts already covered by a survivor are skipped, so the cached copy
    /// (with its id and timestamp) wins over the fresh one.
    pub async fn sync_selected(&self, selected: &[String]) -> Result<SyncReport, SyncError> {
        let mut cache = self.cache.lock().await;
        let snapshot = self.fetch_and_parse().await?;
        let remote = snapshot.prompts;

        let keep: Vec<Prompt> = {
            let remote = identity_set(&remote);
            cache
                .prompts()
                .iter()
                .filter(|cached| remote.contains(&identity_key(cached)))
                .cloned()
                .collect()
        };
        let deleted_prompts = cache.prompts().len() - keep.len();

        let incoming: Vec<Prompt> = mark_cloud(
            remote
                .into_iter()
                .filter(|prompt| selected.contains(&prompt.category_id))
                .collect(),
        );
        let synced_prompts = incoming.len();
        let new_unique = filter_out_duplicates(incoming, &keep);
        let added = new_unique.len();

        let mut prompts = keep;
        prompts.extend(new_unique);

        let mut categories = cache.categories().to_vec();
        for category in selected {
            if !categories.contains(category) {
                categories.push(category.clone());
            }
        }

        cache.replace(prompts, categories.clone())?;
        tracing::info!(
            ?selected,
            synced_prompts,
            added,
            deleted_prompts,
            "synced selected cloud categories"
        );
        Ok(SyncReport {
            synced_prompts,
            deleted_prompts,
            categories,
        })
    }

    /// Drops a category and its prompts from the cache only. Returns the
    /// number of prompts removed.
    pub async fn remove_category(&self, category_id: &str) -> Result<usize, SyncError> {
        let mut cache = self.cache.lock().await;
        let before = cache.prompts().len();
        let prompts: Vec<Prompt> = cache
            .prompts()
            .iter()
            .filter(|prompt| prompt.category_id != category_id)
            .cloned()
            .collect();
        let removed = before - prompts.len();
        let categories: Vec<String> = cache
            .categories()
            .iter()
            .filter(|category| category.as_str() != category_id)
            .cloned()
            .collect();

        cache.replace(prompts, categories)?;
        tracing::info!(category = category_id, removed, "removed cloud category from cache");
        Ok(removed)
    }
}

fn mark_cloud(prompts: Vec<Prompt>) -> Vec<Prompt> {
    prompts
        .into_iter()
        .map(|mut prompt| {
            prompt.is_cloud = Some(true);
            prompt
        })
        .collect()
}
