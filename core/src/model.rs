//! Prompt and category records shared by the local store and the cloud cache.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Id (and forced name) of the category that always exists.
pub const DEFAULT_CATEGORY_ID: &str = "Default";

/// Labels synthesized from content are cut to this many characters.
pub const LABEL_MAX_CHARS: usize = 30;

/// Key used by the remote document when a prompt has neither alias nor label.
pub const UNNAMED_PROMPT: &str = "Unnamed Prompt";

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_RANDOM_LEN: usize = 9;

/// A saved text snippet.
///
/// `id` is a surrogate used to address a slot; it never takes part in
/// equality between prompts (see [`crate::identity`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Owning category. Doubles as the nesting key of the remote document.
    #[serde(default)]
    pub category_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_cloud: Option<bool>,
}

impl Prompt {
    /// The alias when present, otherwise the label.
    pub fn alias_or_label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.label)
    }

    /// Key under which the prompt is published: the alias when present
    /// (even an empty one), then a non-empty label, then [`UNNAMED_PROMPT`].
    pub fn document_key(&self) -> &str {
        match (&self.alias, self.label.as_str()) {
            (Some(alias), _) => alias.as_str(),
            (None, "") => UNNAMED_PROMPT,
            (None, label) => label,
        }
    }

    /// Copy of this prompt with `alias` filled from `label` when absent.
    /// An empty label counts as missing and leaves the alias unset.
    pub fn with_normalized_alias(&self) -> Prompt {
        let mut prompt = self.clone();
        if prompt.alias.is_none() && !prompt.label.is_empty() {
            prompt.alias = Some(prompt.label.clone());
        }
        prompt
    }
}

/// A named grouping of prompts. The id is stable and is what prompts refer to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn default_category() -> Self {
        Self::new(DEFAULT_CATEGORY_ID, DEFAULT_CATEGORY_ID)
    }

    /// Both id and name carry non-whitespace text.
    pub fn is_pristine(&self) -> bool {
        !self.id.trim().is_empty() && !self.name.trim().is_empty()
    }
}

/// Label shown for a prompt that only has content: the first
/// [`LABEL_MAX_CHARS`] characters, with `...` appended when cut.
pub fn label_from_content(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(LABEL_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Surrogate id of the form `cmd_<timestamp>_<random>`.
pub fn generate_prompt_id(timestamp_ms: i64) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ID_RANDOM_LEN)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("cmd_{timestamp_ms}_{suffix}")
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
