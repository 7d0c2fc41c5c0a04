//! Prompt data model, content identity, the remote document codec and the
//! local prompt store.
//!
//! Everything here is transport-agnostic; the reconciliation service in
//! `promptsync-service` builds on these pieces.

pub mod codec;
pub mod events;
pub mod identity;
pub mod integrity;
pub mod local_store;
pub mod model;
pub mod state;

pub use codec::{CodecError, PromptDocument, PromptEntry};
pub use events::{ChangeEvent, ChangeNotifier};
pub use identity::{filter_out_duplicates, is_same_prompt, remove_duplicates};
pub use local_store::{LocalStore, LocalStoreError, NewPrompt, PromptEdit};
pub use model::{Category, DEFAULT_CATEGORY_ID, Prompt};
pub use state::{JsonFileStore, MemoryStore, StateStore, StoreError};
