//! The user's own prompts and categories.
//!
//! A category's id is also its display name and the key it is published
//! under, so renaming a category rewrites the id of the category and of
//! every prompt it owns. Every mutation rejects results that would turn a
//! prompt into a duplicate of another (see [`crate::identity`]).

use std::sync::Arc;

use crate::events::{ChangeEvent, ChangeNotifier};
use crate::identity::{filter_out_duplicates, is_same_prompt, remove_duplicates};
use crate::integrity;
use crate::model::{
    Category, DEFAULT_CATEGORY_ID, Prompt, generate_prompt_id, label_from_content, now_millis,
};
use crate::state::{
    LOCAL_CATEGORIES_KEY, LOCAL_PROMPTS_KEY, StateStore, StoreError, load_or_default, save_as,
};

#[derive(Debug, thiserror::Error)]
pub enum LocalStoreError {
    #[error("an identical prompt already exists in category {category}")]
    DuplicatePrompt { category: String },

    #[error("prompt not found: {id}")]
    PromptNotFound { id: String },

    #[error("category not found: {id}")]
    CategoryNotFound { id: String },

    #[error("category already exists: {id}")]
    CategoryExists { id: String },

    #[error("the default category cannot be renamed or deleted")]
    DefaultCategoryProtected,

    #[error("invalid name: {reason}")]
    InvalidName { reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, LocalStoreError>;

/// Input for [`LocalStore::add_prompt`].
#[derive(Debug, Clone, Default)]
pub struct NewPrompt {
    pub content: String,
    /// Blank labels are derived from the content.
    pub label: Option<String>,
    pub alias: Option<String>,
    /// `None` files the prompt under the default category.
    pub category_id: Option<String>,
}

/// Partial edit for [`LocalStore::update_prompt`]. `None` leaves a field as
/// is; `alias: Some("")` clears the alias.
#[derive(Debug, Clone, Default)]
pub struct PromptEdit {
    pub label: Option<String>,
    pub alias: Option<String>,
    pub content: Option<String>,
}

pub struct LocalStore {
    state: Arc<dyn StateStore>,
    notifier: ChangeNotifier,
    prompts: Vec<Prompt>,
    categories: Vec<Category>,
}

impl LocalStore {
    /// Loads persisted state and runs category repair. Repaired state is
    /// written back only when repair changed something.
    pub fn open(state: Arc<dyn StateStore>, notifier: ChangeNotifier) -> Result<Self> {
        let prompts: Vec<Prompt> = load_or_default(state.as_ref(), LOCAL_PROMPTS_KEY)?;
        let categories: Vec<Category> = load_or_default(state.as_ref(), LOCAL_CATEGORIES_KEY)?;
        let mut store = Self {
            state,
            notifier,
            prompts,
            categories,
        };
        store.repair()?;
        Ok(store)
    }

    /// Idempotent category repair; see [`integrity::repair`].
    pub fn repair(&mut self) -> Result<bool> {
        let mut prompts = self.prompts.clone();
        let mut categories = self.categories.clone();
        let outcome = integrity::repair(&mut prompts, &mut categories);
        self.commit(
            outcome.prompts_changed.then_some(prompts),
            outcome.categories_changed.then_some(categories),
        )?;
        Ok(outcome.changed())
    }

    pub fn prompts(&self) -> &[Prompt] {
        &self.prompts
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn prompt(&self, id: &str) -> Option<&Prompt> {
        self.prompts.iter().find(|p| p.id == id)
    }

    /// Local prompts filed under any of `category_ids`, in store order.
    pub fn prompts_in(&self, category_ids: &[String]) -> Vec<Prompt> {
        self.prompts
            .iter()
            .filter(|p| category_ids.contains(&p.category_id))
            .cloned()
            .collect()
    }

    pub fn add_prompt(&mut self, new: NewPrompt) -> Result<Prompt> {
        let category_id = new
            .category_id
            .unwrap_or_else(|| DEFAULT_CATEGORY_ID.to_string());
        self.require_category(&category_id)?;

        let timestamp = now_millis();
        let label = match new.label {
            Some(label) if !label.trim().is_empty() => label,
            _ => label_from_content(&new.content),
        };
        let prompt = Prompt {
            id: generate_prompt_id(timestamp),
            label,
            content: new.content,
            timestamp,
            alias: new.alias.filter(|alias| !alias.is_empty()),
            category_id,
            is_cloud: None,
        };
        self.ensure_unique(&prompt, None)?;

        let mut prompts = self.prompts.clone();
        prompts.push(prompt.clone());
        self.commit(Some(prompts), None)?;
        tracing::debug!(id = %prompt.id, category = %prompt.category_id, "added prompt");
        Ok(prompt)
    }

    /// Renames and/or edits a prompt.
    pub fn update_prompt(&mut self, id: &str, edit: PromptEdit) -> Result<Prompt> {
        let index = self.index_of(id)?;
        let mut updated = self.prompts[index].clone();
        if let Some(label) = edit.label {
            updated.label = label;
        }
        if let Some(alias) = edit.alias {
            updated.alias = Some(alias).filter(|alias| !alias.is_empty());
        }
        if let Some(content) = edit.content {
            updated.content = content;
        }
        updated.timestamp = now_millis();
        self.ensure_unique(&updated, Some(id))?;

        self.replace_prompt(index, updated.clone())?;
        Ok(updated)
    }

    pub fn move_prompt(&mut self, id: &str, category_id: &str) -> Result<Prompt> {
        self.require_category(category_id)?;
        let index = self.index_of(id)?;
        let mut moved = self.prompts[index].clone();
        moved.category_id = category_id.to_string();
        self.ensure_unique(&moved, Some(id))?;

        self.replace_prompt(index, moved.clone())?;
        Ok(moved)
    }

    pub fn delete_prompt(&mut self, id: &str) -> Result<Prompt> {
        let index = self.index_of(id)?;
        let mut prompts = self.prompts.clone();
        let removed = prompts.remove(index);
        self.commit(Some(prompts), None)?;
        Ok(removed)
    }

    /// Adds a category whose id and name are both `name`.
    pub fn add_category(&mut self, name: &str) -> Result<Category> {
        let name = validate_name(name)?;
        if self.has_category(&name) {
            return Err(LocalStoreError::CategoryExists { id: name });
        }
        let category = Category::new(name.clone(), name);
        let mut categories = self.categories.clone();
        categories.push(category.clone());
        self.commit(None, Some(categories))?;
        Ok(category)
    }

    /// Renames a category and rewrites the category id of every prompt it
    /// owns. Returns the number of prompts rewritten.
    pub fn rename_category(&mut self, id: &str, new_name: &str) -> Result<usize> {
        if id == DEFAULT_CATEGORY_ID {
            return Err(LocalStoreError::DefaultCategoryProtected);
        }
        let new_name = validate_name(new_name)?;
        self.require_category(id)?;
        if new_name == id {
            return Ok(0);
        }
        if self.has_category(&new_name) {
            return Err(LocalStoreError::CategoryExists { id: new_name });
        }

        let mut prompts = self.prompts.clone();
        let mut rewritten = 0;
        for prompt in prompts.iter_mut().filter(|p| p.category_id == id) {
            prompt.category_id = new_name.clone();
            rewritten += 1;
        }
        let mut categories = self.categories.clone();
        for category in categories.iter_mut().filter(|c| c.id == id) {
            category.id = new_name.clone();
            category.name = new_name.clone();
        }

        self.commit((rewritten > 0).then_some(prompts), Some(categories))?;
        Ok(rewritten)
    }

    /// Deletes a category and moves its prompts to the default category.
    /// Moved prompts that duplicate an existing default prompt are dropped.
    /// Returns the number of prompts moved.
    pub fn delete_category(&mut self, id: &str) -> Result<usize> {
        if id == DEFAULT_CATEGORY_ID {
            return Err(LocalStoreError::DefaultCategoryProtected);
        }
        self.require_category(id)?;

        let mut prompts = self.prompts.clone();
        let mut moved = 0;
        for prompt in prompts.iter_mut().filter(|p| p.category_id == id) {
            prompt.category_id = DEFAULT_CATEGORY_ID.to_string();
            moved += 1;
        }
        let categories: Vec<Category> = self
            .categories
            .iter()
            .filter(|c| c.id != id)
            .cloned()
            .collect();

        let prompts = if moved > 0 {
            let before = prompts.len();
            let prompts = remove_duplicates(prompts);
            if prompts.len() < before {
                tracing::info!(
                    dropped = before - prompts.len(),
                    "dropped duplicates after moving prompts to {DEFAULT_CATEGORY_ID}"
                );
            }
            Some(prompts)
        } else {
            None
        };
        self.commit(prompts, Some(categories))?;
        Ok(moved)
    }

    /// Copies prompts (typically from the cloud cache) into the local store.
    ///
    /// Prompts already present locally are skipped, copies get fresh ids
    /// and lose the cloud flag, and missing categories are created.
    /// Returns the prompts actually added.
    pub fn import_prompts(&mut self, prompts: Vec<Prompt>) -> Result<Vec<Prompt>> {
        let fresh = remove_duplicates(filter_out_duplicates(prompts, &self.prompts));
        if fresh.is_empty() {
            return Ok(fresh);
        }

        let timestamp = now_millis();
        let mut categories = self.categories.clone();
        let mut added = Vec::with_capacity(fresh.len());
        for mut prompt in fresh {
            if !categories.iter().any(|c| c.id == prompt.category_id) {
                categories.push(Category::new(
                    prompt.category_id.clone(),
                    prompt.category_id.clone(),
                ));
            }
            prompt.id = generate_prompt_id(timestamp);
            prompt.is_cloud = None;
            added.push(prompt);
        }

        let categories_added = categories.len() > self.categories.len();
        let mut prompts = self.prompts.clone();
        prompts.extend(added.iter().cloned());
        self.commit(Some(prompts), categories_added.then_some(categories))?;
        Ok(added)
    }

    fn has_category(&self, id: &str) -> bool {
        self.categories.iter().any(|c| c.id == id)
    }

    fn require_category(&self, id: &str) -> Result<()> {
        if self.has_category(id) {
            Ok(())
        } else {
            Err(LocalStoreError::CategoryNotFound { id: id.to_string() })
        }
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.prompts
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| LocalStoreError::PromptNotFound { id: id.to_string() })
    }

    /// Fails when `candidate` equals any stored prompt other than `except`.
    fn ensure_unique(&self, candidate: &Prompt, except: Option<&str>) -> Result<()> {
        let clash = self
            .prompts
            .iter()
            .filter(|p| Some(p.id.as_str()) != except)
            .any(|p| is_same_prompt(p, candidate));
        if clash {
            Err(LocalStoreError::DuplicatePrompt {
                category: candidate.category_id.clone(),
            })
        } else {
            Ok(())
        }
    }

    fn replace_prompt(&mut self, index: usize, prompt: Prompt) -> Result<()> {
        let mut prompts = self.prompts.clone();
        prompts[index] = prompt;
        self.commit(Some(prompts), None)
    }

    /// Writes the given lists, then swaps them in and notifies. In-memory
    /// state only changes once every write succeeded. When the category
    /// write fails after the prompt write, the previous prompts are written
    /// back so the two keys stay consistent.
    fn commit(
        &mut self,
        prompts: Option<Vec<Prompt>>,
        categories: Option<Vec<Category>>,
    ) -> Result<()> {
        if let Some(prompts) = &prompts {
            save_as(self.state.as_ref(), LOCAL_PROMPTS_KEY, prompts)?;
        }
        if let Some(categories) = &categories
            && let Err(err) = save_as(self.state.as_ref(), LOCAL_CATEGORIES_KEY, categories)
        {
            if prompts.is_some()
                && let Err(rollback) = save_as(self.state.as_ref(), LOCAL_PROMPTS_KEY, &self.prompts)
            {
                tracing::warn!(error = %rollback, "failed to restore prompts after a failed write");
            }
            return Err(err.into());
        }

        if let Some(prompts) = prompts {
            self.prompts = prompts;
            self.notifier.notify(ChangeEvent::LocalPrompts);
        }
        if let Some(categories) = categories {
            self.categories = categories;
            self.notifier.notify(ChangeEvent::LocalCategories);
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LocalStoreError::InvalidName {
            reason: "category name must not be blank".to_string(),
        });
    }
    Ok(trimmed.to_string())
}
