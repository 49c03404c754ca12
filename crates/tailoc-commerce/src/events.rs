//! # Domain Events
//!
//! Fire-and-forget notifications published after a transaction commits.
//!
//! ```text
//! InventoryLedger / OrderWorkflow
//!        │ commit
//!        ▼
//!   EventBus::publish ──► broadcast::Sender<DomainEvent>
//!                              │
//!                 ┌────────────┼────────────┐
//!                 ▼            ▼            ▼
//!            subscriber   subscriber   (none: dropped)
//! ```
//!
//! Events are never published for rolled-back work. A subscriber that lags
//! more than the channel capacity loses the oldest events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use tailoc_core::MovementKind;

/// Something that happened in the store.
///
/// Serialized as `{ "type": "OrderConfirmed", "payload": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum DomainEvent {
    OrderConfirmed {
        order_id: String,
        user_id: String,
        total_cents: i64,
        item_count: i64,
    },

    OrderCancelled {
        order_id: String,
        user_id: String,
        reason: Option<String>,
    },

    /// A stock or reservation counter changed.
    StockAdjusted {
        product_id: String,
        kind: MovementKind,
        quantity: i64,
        previous_stock: i64,
        new_stock: i64,
        reserved: i64,
        reference_id: Option<String>,
    },

    /// Stock fell to or below the product's threshold.
    LowStock {
        product_id: String,
        sku: String,
        stock: i64,
        threshold: i64,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::OrderConfirmed { .. } => "order_confirmed",
            DomainEvent::OrderCancelled { .. } => "order_cancelled",
            DomainEvent::StockAdjusted { .. } => "stock_adjusted",
            DomainEvent::LowStock { .. } => "low_stock",
        }
    }
}

/// Broadcast bus for [`DomainEvent`]s. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    /// Publishes to current subscribers and returns how many received it.
    pub fn publish(&self, event: DomainEvent) -> usize {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!(event = name, receivers, "Published domain event");
                receivers
            }
            Err(_) => {
                debug!(event = name, "No subscribers for domain event");
                0
            }
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = DomainEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(256)
    }
}
