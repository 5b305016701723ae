use serde::{Deserialize, Serialize};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::TransactionType;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving end of a bounded channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Queues an event without waiting; when the channel is full or closed
    /// the event is dropped and logged.
    pub fn publish(&self, event: Event) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                counter!("stockscan_events_dropped_total", 1, "reason" => "full");
                warn!(event = event.name(), "event channel full; event dropped");
            }
            Err(TrySendError::Closed(event)) => {
                counter!("stockscan_events_dropped_total", 1, "reason" => "closed");
                warn!(event = event.name(), "event channel closed; event dropped");
            }
        }
    }
}

/// Domain events emitted after a change has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    LocationCreated(Uuid),
    SupplierCreated(Uuid),
    ItemCreated {
        item_id: Uuid,
        sku: String,
        barcode: String,
    },
    StockAdjusted {
        item_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
        transaction_id: Option<Uuid>,
    },
    LowStock {
        item_id: Uuid,
        quantity: i32,
        reorder_point: i32,
    },
    TransactionCreated {
        transaction_id: Uuid,
        item_id: Uuid,
        transaction_type: TransactionType,
        quantity: i32,
    },
    TransactionApproved(Uuid),
    TransactionCompleted(Uuid),
    TransactionCancelled(Uuid),
    TransactionFailed {
        transaction_id: Uuid,
        reason: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::LocationCreated(_) => "location.created",
            Event::SupplierCreated(_) => "supplier.created",
            Event::ItemCreated { .. } => "item.created",
            Event::StockAdjusted { .. } => "item.stock_adjusted",
            Event::LowStock { .. } => "item.low_stock",
            Event::TransactionCreated { .. } => "transaction.created",
            Event::TransactionApproved(_) => "transaction.approved",
            Event::TransactionCompleted(_) => "transaction.completed",
            Event::TransactionCancelled(_) => "transaction.cancelled",
            Event::TransactionFailed { .. } => "transaction.failed",
        }
    }
}

/// Drains the channel until every sender is gone, logging each event.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::counter!("stockscan_events_total", 1, "event" => event.name());

        match &event {
            Event::LowStock {
                item_id,
                quantity,
                reorder_point,
            } => {
                warn!(
                    %item_id,
                    quantity,
                    reorder_point,
                    "item at or below reorder point"
                );
            }
            Event::TransactionFailed {
                transaction_id,
                reason,
            } => {
                warn!(%transaction_id, %reason, "transaction failed");
            }
            other => {
                info!(event = other.name(), payload = ?other, "event");
            }
        }
    }

    info!("Event channel closed; event processing loop finished");
}
