//! Content identity for prompts.
//!
//! Two prompts are the same prompt when they share the category, the
//! alias-or-label and the content. Surrogate ids, timestamps and the cloud
//! flag are ignored, so a re-synced copy with a fresh id still matches.

use std::collections::HashSet;

use crate::model::Prompt;

/// Borrowed `(category, alias-or-label, content)` triple.
pub type IdentityKey<'a> = (&'a str, &'a str, &'a str);

pub fn identity_key(prompt: &Prompt) -> IdentityKey<'_> {
    (
        prompt.category_id.as_str(),
        prompt.alias_or_label(),
        prompt.content.as_str(),
    )
}

pub fn is_same_prompt(a: &Prompt, b: &Prompt) -> bool {
    identity_key(a) == identity_key(b)
}

/// Keeps the first occurrence of every prompt and drops later equal ones.
/// Order of the survivors is preserved.
pub fn remove_duplicates(prompts: Vec<Prompt>) -> Vec<Prompt> {
    let mut seen: HashSet<(String, String, String)> = HashSet::with_capacity(prompts.len());
    prompts
        .into_iter()
        .filter(|prompt| {
            let (category, key, content) = identity_key(prompt);
            seen.insert((category.to_string(), key.to_string(), content.to_string()))
        })
        .collect()
}

/// Entries of `incoming` with no equal counterpart in `existing`.
///
/// Duplicates inside `incoming` itself are left alone.
pub fn filter_out_duplicates(incoming: Vec<Prompt>, existing: &[Prompt]) -> Vec<Prompt> {
    let known = identity_set(existing);
    incoming
        .into_iter()
        .filter(|prompt| !known.contains(&identity_key(prompt)))
        .collect()
}

/// Identity keys of `prompts`, for repeated membership checks.
pub fn identity_set(prompts: &[Prompt]) -> HashSet<IdentityKey<'_>> {
    prompts.iter().map(identity_key).collect()
}
