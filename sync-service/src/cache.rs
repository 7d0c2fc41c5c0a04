//! Persisted read-through copy of the remote document.

use std::sync::Arc;

use promptsync_core::state::{
    CLOUD_CATEGORIES_KEY, CLOUD_PROMPTS_KEY, load_or_default, save_as,
};
use promptsync_core::{ChangeEvent, ChangeNotifier, Prompt, StateStore, StoreError};

/// Cached cloud prompts and the categories pulled into the cache.
///
/// The cache is derived data: syncs replace it, nothing edits entries in
/// place.
pub struct CloudCache {
    state: Arc<dyn StateStore>,
    notifier: ChangeNotifier,
    prompts: Vec<Prompt>,
    categories: Vec<String>,
}

impl CloudCache {
    pub fn load(state: Arc<dyn StateStore>, notifier: ChangeNotifier) -> Result<Self, StoreError> {
        let prompts = load_or_default(state.as_ref(), CLOUD_PROMPTS_KEY)?;
        let categories = load_or_default(state.as_ref(), CLOUD_CATEGORIES_KEY)?;
        Ok(Self {
            state,
            notifier,
            prompts,
            categories,
        })
    }

    pub fn prompts(&self) -> &[Prompt] {
        &self.prompts
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Persists both lists, then swaps them in and notifies. In-memory state
    /// is left as it was when a write fails.
    pub fn replace(&mut self, prompts: Vec<Prompt>, categories: Vec<String>) -> Result<(), StoreError> {
        save_as(self.state.as_ref(), CLOUD_PROMPTS_KEY, &prompts)?;
        save_as(self.state.as_ref(), CLOUD_CATEGORIES_KEY, &categories)?;
        self.prompts = prompts;
        self.categories = categories;
        self.notifier.notify(ChangeEvent::CloudPrompts);
        self.notifier.notify(ChangeEvent::CloudCategories);
        Ok(())
    }
}
