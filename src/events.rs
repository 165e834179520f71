use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangedEntity {
    Order,
    Product,
}

/// A full-replacement snapshot of a changed row. Consumers must treat
/// `row` as authoritative and tolerate duplicate or out-of-order delivery.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EntityChange {
    pub entity: ChangedEntity,
    pub id: Uuid,
    /// Owner of the row, used to scope customer subscriptions.
    pub user_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub row: serde_json::Value,
}

/// In-process publish/subscribe channel for entity change notifications,
/// independent of the backing store.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<EntityChange>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a change. A send error only means there is no subscriber.
    pub fn publish(&self, change: EntityChange) {
        if self.tx.send(change).is_err() {
            tracing::trace!("entity change dropped: no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EntityChange> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
