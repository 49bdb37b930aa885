use crate::entities::{InvoiceStatus, TransactionType, WorkOrderStatus};
use metrics::counter;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted after a unit of work commits.
#[derive(Debug, Clone, Serialize)]
pub enum Event {
    CustomerCreated(Uuid),
    CustomerUpdated(Uuid),
    CustomerDeleted(Uuid),

    VehicleCreated(Uuid),
    VehicleUpdated(Uuid),
    VehicleDeleted(Uuid),

    TechnicianCreated(Uuid),
    TechnicianUpdated(Uuid),

    AppointmentScheduled(Uuid),
    AppointmentUpdated(Uuid),
    AppointmentDeleted(Uuid),

    WorkOrderCreated {
        work_order_id: Uuid,
        order_number: String,
    },
    WorkOrderUpdated {
        work_order_id: Uuid,
        status: WorkOrderStatus,
    },
    WorkOrderStatusChanged {
        work_order_id: Uuid,
        old_status: WorkOrderStatus,
        new_status: WorkOrderStatus,
    },
    WorkOrderDeleted {
        work_order_id: Uuid,
        order_number: String,
    },

    InventoryItemCreated(Uuid),
    InventoryItemUpdated(Uuid),
    InventoryItemDeleted(Uuid),
    InventoryAdjusted {
        item_id: Uuid,
        transaction_type: TransactionType,
        quantity: i32,
        work_order_id: Option<Uuid>,
    },

    InvoiceGenerated {
        invoice_id: Uuid,
        work_order_id: Uuid,
        total: Decimal,
    },
    InvoiceUpdated(Uuid),
    InvoiceVoided(Uuid),
    PaymentRecorded {
        invoice_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
        invoice_status: InvoiceStatus,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::CustomerCreated(_) => "customer_created",
            Event::CustomerUpdated(_) => "customer_updated",
            Event::CustomerDeleted(_) => "customer_deleted",
            Event::VehicleCreated(_) => "vehicle_created",
            Event::VehicleUpdated(_) => "vehicle_updated",
            Event::VehicleDeleted(_) => "vehicle_deleted",
            Event::TechnicianCreated(_) => "technician_created",
            Event::TechnicianUpdated(_) => "technician_updated",
            Event::AppointmentScheduled(_) => "appointment_scheduled",
            Event::AppointmentUpdated(_) => "appointment_updated",
            Event::AppointmentDeleted(_) => "appointment_deleted",
            Event::WorkOrderCreated { .. } => "work_order_created",
            Event::WorkOrderUpdated { .. } => "work_order_updated",
            Event::WorkOrderStatusChanged { .. } => "work_order_status_changed",
            Event::WorkOrderDeleted { .. } => "work_order_deleted",
            Event::InventoryItemCreated(_) => "inventory_item_created",
            Event::InventoryItemUpdated(_) => "inventory_item_updated",
            Event::InventoryItemDeleted(_) => "inventory_item_deleted",
            Event::InventoryAdjusted { .. } => "inventory_adjusted",
            Event::InvoiceGenerated { .. } => "invoice_generated",
            Event::InvoiceUpdated(_) => "invoice_updated",
            Event::InvoiceVoided(_) => "invoice_voided",
            Event::PaymentRecorded { .. } => "payment_recorded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends every event in order. The writes they describe are already
    /// committed, so a closed channel is logged and otherwise ignored.
    pub async fn publish(&self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            let name = event.name();
            if let Err(e) = self.send(event).await {
                counter!("garage_events.dropped", 1, "event" => name);
                warn!(event = name, error = %e, "dropping domain event");
            }
        }
    }
}

/// Creates the channel backing an [`EventSender`].
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        let name = event.name();
        counter!("garage_events.processed", 1, "event" => name);
        match &event {
            Event::PaymentRecorded {
                invoice_status: InvoiceStatus::Paid,
                invoice_id,
                ..
            } => info!(%invoice_id, "invoice settled"),
            Event::InventoryAdjusted {
                item_id,
                transaction_type,
                quantity,
                ..
            } => info!(%item_id, kind = transaction_type.as_ref(), quantity, "stock moved"),
            _ => {}
        }
        info!(event = name, payload = ?event, "domain event");
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_delivers_in_order() {
        let (sender, mut rx) = channel(8);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        sender
            .publish([Event::CustomerCreated(first), Event::CustomerDeleted(second)])
            .await;

        assert!(matches!(rx.recv().await, Some(Event::CustomerCreated(id)) if id == first));
        assert!(matches!(rx.recv().await, Some(Event::CustomerDeleted(id)) if id == second));
    }

    #[tokio::test]
    async fn publish_tolerates_a_closed_channel() {
        let (sender, rx) = channel(1);
        drop(rx);
        sender.publish([Event::InvoiceVoided(Uuid::new_v4())]).await;
        assert!(sender.send(Event::InvoiceVoided(Uuid::new_v4())).await.is_err());
    }
}
