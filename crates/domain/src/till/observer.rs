//! Reverses the till entry of a payment set back to pending.

use crate::error::Result;
use crate::events::{CoreEvent, EventHandler};
use crate::payment::PaymentStatus;
use crate::store::Transaction;

use super::TillService;

/// Bus subscriber keeping till balances in step with un-paid payments.
#[derive(Debug, Clone, Default)]
pub struct PaymentReversalObserver {
    tills: TillService,
}

impl PaymentReversalObserver {
    pub fn new(tills: TillService) -> Self {
        Self { tills }
    }
}

impl EventHandler for PaymentReversalObserver {
    fn name(&self) -> &'static str {
        "payment_reversal"
    }

    fn handle(&self, tx: &mut Transaction, event: &CoreEvent) -> Result<()> {
        match event {
            CoreEvent::PaymentStatusChanged {
                payment_id,
                old: PaymentStatus::Paid,
                new: PaymentStatus::Pending,
            } => {
                self.tills.reverse_entry(tx, *payment_id)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
