//! Change notifications for persisted prompt state.

use tokio::sync::broadcast;

/// Capacity of the notification channel. Slow subscribers observe
/// `RecvError::Lagged` rather than blocking writers.
const CHANNEL_CAPACITY: usize = 64;

/// Which piece of state was rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    LocalPrompts,
    LocalCategories,
    CloudPrompts,
    CloudCategories,
}

/// Cloneable sender side; every clone feeds the same subscribers.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn notify(&self, event: ChangeEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
