//! Startup repair of local category data.
//!
//! Older data can contain prompts without a category, categories with a
//! blank id or name, or a default category whose name was edited. Repair
//! folds all of that back onto the default category. Running it on clean
//! data changes nothing.

use std::collections::HashSet;

use crate::model::{Category, DEFAULT_CATEGORY_ID, Prompt};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairOutcome {
    pub prompts_changed: bool,
    pub categories_changed: bool,
}

impl RepairOutcome {
    pub fn changed(&self) -> bool {
        self.prompts_changed || self.categories_changed
    }
}

/// Repairs `prompts` and `categories` in place.
pub fn repair(prompts: &mut [Prompt], categories: &mut Vec<Category>) -> RepairOutcome {
    let mut outcome = RepairOutcome::default();

    for prompt in prompts.iter_mut() {
        if prompt.category_id.trim().is_empty() {
            prompt.category_id = DEFAULT_CATEGORY_ID.to_string();
            outcome.prompts_changed = true;
        }
    }

    let (pristine, corrupted): (Vec<Category>, Vec<Category>) = categories
        .iter()
        .cloned()
        .partition(Category::is_pristine);

    // Ids of broken records whose prompts must move. A broken record that
    // reuses the id of a pristine category is only a stale duplicate; the
    // pristine category survives repair and keeps its prompts.
    let source_ids: HashSet<String> = corrupted
        .into_iter()
        .map(|category| category.id)
        .filter(|id| {
            !id.trim().is_empty()
                && id != DEFAULT_CATEGORY_ID
                && !pristine.iter().any(|category| &category.id == id)
        })
        .collect();

    if !source_ids.is_empty() {
        for prompt in prompts.iter_mut() {
            if source_ids.contains(&prompt.category_id) {
                prompt.category_id = DEFAULT_CATEGORY_ID.to_string();
                outcome.prompts_changed = true;
            }
        }
    }

    let mut repaired = Vec::with_capacity(pristine.len() + 1);
    let mut has_default = false;
    for category in pristine {
        if category.id == DEFAULT_CATEGORY_ID {
            if !has_default {
                repaired.push(Category::default_category());
                has_default = true;
            }
        } else {
            repaired.push(category);
        }
    }
    if !has_default {
        repaired.insert(0, Category::default_category());
    }

    if repaired != *categories {
        tracing::warn!(
            before = categories.len(),
            after = repaired.len(),
            "repaired local categories"
        );
        *categories = repaired;
        outcome.categories_changed = true;
    }

    outcome
}
