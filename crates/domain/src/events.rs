//! Synchronous in-transaction event bus for cross-aggregate reactions.

use std::sync::Arc;

use common::{PaymentId, SaleId, TillId, WorkOrderId};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::payment::PaymentStatus;
use crate::sale::SaleStatus;
use crate::store::Transaction;
use crate::till::TillStatus;
use crate::workorder::WorkOrderStatus;

/// Notifications other aggregates may react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CoreEvent {
    SaleStatusChanged {
        sale_id: SaleId,
        old: SaleStatus,
        new: SaleStatus,
    },
    WorkOrderStatusChanged {
        work_order_id: WorkOrderId,
        old: WorkOrderStatus,
        new: WorkOrderStatus,
    },
    PaymentStatusChanged {
        payment_id: PaymentId,
        old: PaymentStatus,
        new: PaymentStatus,
    },
    TillStatusChanged {
        till_id: TillId,
        old: TillStatus,
        new: TillStatus,
    },
}

impl CoreEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            CoreEvent::SaleStatusChanged { .. } => "SaleStatusChanged",
            CoreEvent::WorkOrderStatusChanged { .. } => "WorkOrderStatusChanged",
            CoreEvent::PaymentStatusChanged { .. } => "PaymentStatusChanged",
            CoreEvent::TillStatusChanged { .. } => "TillStatusChanged",
        }
    }
}

/// A subscriber. Runs inside the emitting transaction; an error aborts it.
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(&self, tx: &mut Transaction, event: &CoreEvent) -> Result<()>;
}

/// Subscribers registered at start-up, called in registration order.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: Arc<dyn EventHandler>) {
        tracing::debug!(handler = handler.name(), "event handler registered");
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn publish(&self, tx: &mut Transaction, event: &CoreEvent) -> Result<()> {
        for handler in &self.handlers {
            tracing::trace!(handler = handler.name(), event = event.event_type(), "dispatching");
            handler.handle(tx, event)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.iter().map(|h| h.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use common::{BranchId, UserId};
    use journal::InMemoryJournal;

    use super::*;
    use crate::clock::SystemClock;
    use crate::error::DomainError;
    use crate::store::{Database, SessionContext};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<&'static str>>,
    }

    impl EventHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn handle(&self, _tx: &mut Transaction, event: &CoreEvent) -> Result<()> {
            self.seen.lock().unwrap().push(event.event_type());
            Ok(())
        }
    }

    struct Refuser;

    impl EventHandler for Refuser {
        fn name(&self) -> &'static str {
            "refuser"
        }

        fn handle(&self, _tx: &mut Transaction, _event: &CoreEvent) -> Result<()> {
            Err(DomainError::InvalidValue("refused".to_string()))
        }
    }

    fn event() -> CoreEvent {
        CoreEvent::TillStatusChanged {
            till_id: TillId::new(),
            old: TillStatus::Pending,
            new: TillStatus::Open,
        }
    }

    async fn begin(bus: EventBus) -> Transaction {
        let db = Database::new(
            Arc::new(InMemoryJournal::new()),
            Arc::new(SystemClock),
            bus,
        );
        db.begin(SessionContext::new(UserId::new(), BranchId::new()))
            .await
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let recorder = Arc::new(Recorder::default());
        let mut bus = EventBus::new();
        bus.subscribe(recorder.clone());
        assert_eq!(bus.len(), 1);

        let mut tx = begin(bus).await;
        tx.publish(event()).unwrap();
        tx.publish(event()).unwrap();

        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec!["TillStatusChanged", "TillStatusChanged"]
        );
    }

    #[tokio::test]
    async fn handler_error_reaches_the_publisher() {
        let recorder = Arc::new(Recorder::default());
        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(Refuser));
        bus.subscribe(recorder.clone());

        let mut tx = begin(bus).await;
        assert!(tx.publish(event()).is_err());
        assert!(recorder.seen.lock().unwrap().is_empty());
    }
}
