//! Change notifications — tells interested parts of the process that data moved.
//! Explicit publish/subscribe instead of an implicit global event bus.

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::broadcast;

/// Something in the store changed. Serializes as `{"type": "...", ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    TokensChanged { date: NaiveDate },
    TasksCreated { assignees: Vec<String> },
    TaskUpdated { task_id: String },
    SuggestionsChanged,
}

/// Process-owned broadcaster. Cloning shares the same channel.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publishing with no subscribers is fine.
    pub fn publish(&self, event: ChangeEvent) {
        tracing::debug!("🔔 change: {:?}", event);
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}
