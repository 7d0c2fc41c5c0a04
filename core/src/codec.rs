//! Remote document codec.
//!
//! The shared document is UTF-8 JSON shaped as
//! `{ "<category>": { "<alias>": { "content": "<text>" } } }`
//! and travels base64-encoded. This module validates that shape and converts
//! between it and flat [`Prompt`] lists.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Prompt, generate_prompt_id, label_from_content};

#[derive(Debug, Error)]
pub enum CodecError {
    /// The text is not JSON of the expected two-level shape.
    #[error("invalid prompt document: {0}")]
    Validation(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("document is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Leaf of the remote document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptEntry {
    pub content: String,
}

/// Category name → alias → entry, ordered by key at both levels.
///
/// Inserting an alias that already exists under the same category keeps the
/// entry that was inserted first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptDocument {
    categories: BTreeMap<String, BTreeMap<String, PromptEntry>>,
}

impl PromptDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `content` under `(category, alias)` unless that slot is taken.
    /// Returns `false` when an earlier entry won.
    pub fn insert_first_wins(&mut self, category: &str, alias: &str, content: &str) -> bool {
        let aliases = self.categories.entry(category.to_string()).or_default();
        match aliases.entry(alias.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(PromptEntry {
                    content: content.to_string(),
                });
                true
            }
        }
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    pub fn get(&self, category: &str, alias: &str) -> Option<&PromptEntry> {
        self.categories.get(category)?.get(alias)
    }

    /// Total number of entries across all categories.
    pub fn len(&self) -> usize {
        self.categories.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(category, alias, entry)` triples in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &PromptEntry)> {
        self.categories.iter().flat_map(|(category, aliases)| {
            aliases
                .iter()
                .map(move |(alias, entry)| (category.as_str(), alias.as_str(), entry))
        })
    }
}

/// Validates raw JSON text against the document shape.
pub fn parse(raw: &str) -> Result<PromptDocument, CodecError> {
    serde_json::from_str(raw).map_err(|e| CodecError::Validation(e.to_string()))
}

/// Base64 transport payload → UTF-8 text → [`parse`].
///
/// Whitespace inside the payload (line-wrapped base64) is ignored.
pub fn decode(payload: &str) -> Result<PromptDocument, CodecError> {
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(compact)?;
    let text = String::from_utf8(bytes)?;
    parse(&text)
}

/// Groups prompts by category and keys them by [`Prompt::document_key`].
/// Colliding prompts after the first are dropped.
pub fn encode(prompts: &[Prompt]) -> PromptDocument {
    let mut document = PromptDocument::new();
    for prompt in prompts {
        let key = prompt.document_key();
        if !document.insert_first_wins(&prompt.category_id, key, &prompt.content) {
            tracing::debug!(
                category = %prompt.category_id,
                alias = key,
                "dropping prompt that collides with an earlier entry"
            );
        }
    }
    document
}

/// Pretty-printed JSON with two-space indentation.
pub fn to_pretty_json(document: &PromptDocument) -> Result<String, CodecError> {
    serde_json::to_string_pretty(document).map_err(|e| CodecError::Validation(e.to_string()))
}

/// Pretty JSON → base64, ready for the commit payload.
pub fn serialize(document: &PromptDocument) -> Result<String, CodecError> {
    Ok(STANDARD.encode(to_pretty_json(document)?))
}

/// Flattens a document into prompts.
///
/// Every entry gets a fresh `cmd_<fetched_at>_<random>` id and a label cut
/// from its content. `is_cloud` is left unset. Callers should treat the
/// result as a set.
pub fn to_prompts(document: &PromptDocument, fetched_at: i64) -> Vec<Prompt> {
    document
        .entries()
        .map(|(category, alias, entry)| Prompt {
            id: generate_prompt_id(fetched_at),
            label: label_from_content(&entry.content),
            content: entry.content.clone(),
            timestamp: fetched_at,
            alias: Some(alias.to_string()),
            category_id: category.to_string(),
            is_cloud: None,
        })
        .collect()
}
