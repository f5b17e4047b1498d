//! Cancels the work orders of a sale when the sale is cancelled.

use common::SaleId;

use crate::error::Result;
use crate::events::{CoreEvent, EventHandler};
use crate::sale::SaleStatus;
use crate::store::Transaction;

use super::{WorkOrderService, WorkOrderStatus};

/// Bus subscriber coupling sale cancellation to its work orders.
#[derive(Debug, Clone, Default)]
pub struct SaleCancellationObserver {
    work_orders: WorkOrderService,
}

impl SaleCancellationObserver {
    pub fn new(work_orders: WorkOrderService) -> Self {
        Self { work_orders }
    }

    fn cancel_work_orders(&self, tx: &mut Transaction, sale_id: SaleId) -> Result<()> {
        for order in self.work_orders.of_sale(tx, sale_id) {
            match order.status() {
                WorkOrderStatus::Cancelled => continue,
                WorkOrderStatus::Delivered => {
                    tracing::warn!(
                        work_order = %order.id,
                        sale = %sale_id,
                        "sale cancelled after its work order was delivered"
                    );
                    continue;
                }
                WorkOrderStatus::Finished => {
                    self.work_orders
                        .reopen(tx, order.id, "Reopening work order to cancel the sale")?;
                }
                _ => {}
            }
            self.work_orders
                .cancel(tx, order.id, Some("The sale was cancelled"), true)?;
        }
        Ok(())
    }
}

impl EventHandler for SaleCancellationObserver {
    fn name(&self) -> &'static str {
        "sale_cancellation"
    }

    fn handle(&self, tx: &mut Transaction, event: &CoreEvent) -> Result<()> {
        match event {
            CoreEvent::SaleStatusChanged {
                sale_id,
                new: SaleStatus::Cancelled,
                ..
            } => self.cancel_work_orders(tx, *sale_id),
            _ => Ok(()),
        }
    }
}
