//! Work order service: lifecycle, reservations and the link to a sale.

use common::{BatchId, ClientId, Money, SaleId, SellableId, WorkOrderId, WorkOrderItemId};
use rust_decimal::Decimal;

use crate::catalog::CatalogService;
use crate::command::CommandResult;
use crate::error::{DomainError, Result};
use crate::history::{HistoryEntry, HistorySubject};
use crate::sale::{Sale, SaleItem, SaleStatus};
use crate::stock::{StockGateway, StockMovement, StockReason};
use crate::store::{IdentifierKind, Transaction};

use super::{WorkOrder, WorkOrderItem, WorkOrderStatus, sync};

/// Service for managing work orders.
#[derive(Debug, Clone, Default)]
pub struct WorkOrderService {
    catalog: CatalogService,
    stock: StockGateway,
}

impl WorkOrderService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn work_order(&self, tx: &Transaction, id: WorkOrderId) -> Result<WorkOrder> {
        tx.load(id)
    }

    /// Work orders coupled to a sale.
    pub fn of_sale(&self, tx: &Transaction, sale_id: SaleId) -> Vec<WorkOrder> {
        let mut orders = tx.find::<WorkOrder>(|wo| wo.sale_id == Some(sale_id));
        orders.sort_by_key(|wo| wo.identifier);
        orders
    }

    /// Opens a work order held by the transaction's branch.
    #[tracing::instrument(skip(self, tx))]
    pub fn create(
        &self,
        tx: &mut Transaction,
        description: &str,
        client_id: Option<ClientId>,
    ) -> Result<WorkOrderId> {
        tx.run(|tx| {
            if let Some(client_id) = client_id {
                self.catalog.client(tx, client_id)?;
            }
            let identifier = tx.next_identifier(IdentifierKind::WorkOrder);
            let order = WorkOrder::new(identifier, description, tx.branch(), client_id, tx.now());
            let id = order.id;
            tx.save(order);

            metrics::counter!("work_orders_created_total").increment(1);
            tracing::info!(work_order = %id, identifier, "work order opened");
            Ok(id)
        })
    }

    /// Adds an item. On a coupled sale a linked sale item is added as well.
    #[tracing::instrument(skip(self, tx))]
    pub fn add_sellable(
        &self,
        tx: &mut Transaction,
        work_order_id: WorkOrderId,
        sellable_id: SellableId,
        quantity: Decimal,
        price: Option<Money>,
    ) -> Result<WorkOrderItemId> {
        tx.run(|tx| {
            let sellable = self.catalog.sellable(tx, sellable_id)?;
            let manages_stock = sellable.managed_storable()?.is_some();
            let price = price.unwrap_or(sellable.price);
            let mut item = WorkOrderItem::new(sellable_id, quantity, price, manages_stock);

            let order = tx.load::<WorkOrder>(work_order_id)?;
            order.add_item(item.clone())?;
            if let Some(sale_id) = order.sale_id {
                let sale_item = SaleItem::new(sellable_id, quantity, price);
                item.sale_item_id = Some(sale_item.id);
                tx.execute::<Sale, _>(sale_id, |sale| sale.add_item(sale_item))?;
            }

            let id = item.id;
            tx.execute::<WorkOrder, _>(work_order_id, |wo| wo.add_item(item))?;
            Ok(id)
        })
    }

    /// Assigns the batch an item will take its stock from.
    pub fn set_item_batch(
        &self,
        tx: &mut Transaction,
        work_order_id: WorkOrderId,
        item_id: WorkOrderItemId,
        batch_id: BatchId,
    ) -> Result<()> {
        tx.run(|tx| {
            let order = tx.load::<WorkOrder>(work_order_id)?;
            let item = order.item(item_id)?;
            let batch = self.catalog.batch(tx, batch_id)?;
            if batch.sellable_id != item.sellable_id {
                return Err(DomainError::InvalidValue(format!(
                    "batch {} is not of the item's sellable",
                    batch.number
                )));
            }
            let quantity = item.quantity;
            tx.execute::<WorkOrder, _>(work_order_id, |wo| {
                wo.set_item_batch(item_id, batch_id, quantity)
            })?;
            Ok(())
        })
    }

    /// Takes stock at the holding branch for an item and mirrors it onto the
    /// linked sale item.
    #[tracing::instrument(skip(self, tx))]
    pub fn reserve(
        &self,
        tx: &mut Transaction,
        work_order_id: WorkOrderId,
        item_id: WorkOrderItemId,
        quantity: Decimal,
    ) -> Result<()> {
        tx.run(|tx| {
            let order = tx.load::<WorkOrder>(work_order_id)?;
            let branch = tx.branch();
            order.ensure_at(branch)?;
            order.reserve(item_id, quantity)?;
            let item = order.item(item_id)?;

            self.stock.decrease_stock(
                tx,
                StockMovement::new(
                    item.sellable_id,
                    branch,
                    quantity,
                    StockReason::WorkOrderUsed,
                )
                .batch(item.batch_id)
                .reference(work_order_id),
            )?;

            let result = tx.execute::<WorkOrder, _>(work_order_id, |wo| wo.reserve(item_id, quantity))?;
            sync::mirror_to_sale(tx, &result.aggregate, result.aggregate.item(item_id)?)?;
            tracing::debug!(item = %item_id, quantity = %quantity, "work order item reserved");
            Ok(())
        })
    }

    /// Puts reserved stock back and mirrors it onto the linked sale item.
    #[tracing::instrument(skip(self, tx))]
    pub fn return_to_stock(
        &self,
        tx: &mut Transaction,
        work_order_id: WorkOrderId,
        item_id: WorkOrderItemId,
        quantity: Decimal,
    ) -> Result<()> {
        tx.run(|tx| {
            let order = tx.load::<WorkOrder>(work_order_id)?;
            let branch = tx.branch();
            order.ensure_at(branch)?;
            order.return_to_stock(item_id, quantity)?;
            let item = order.item(item_id)?;

            self.stock.increase_stock(
                tx,
                StockMovement::new(
                    item.sellable_id,
                    branch,
                    quantity,
                    StockReason::WorkOrderReturnToStock,
                )
                .batch(item.batch_id)
                .reference(work_order_id),
            )?;

            let result = tx.execute::<WorkOrder, _>(work_order_id, |wo| {
                wo.return_to_stock(item_id, quantity)
            })?;
            sync::mirror_to_sale(tx, &result.aggregate, result.aggregate.item(item_id)?)?;
            Ok(())
        })
    }

    pub fn approve(&self, tx: &mut Transaction, id: WorkOrderId) -> Result<()> {
        tx.run(|tx| {
            let now = tx.now();
            tx.execute::<WorkOrder, _>(id, |wo| wo.approve(now))?;
            Ok(())
        })
    }

    pub fn work(&self, tx: &mut Transaction, id: WorkOrderId) -> Result<()> {
        tx.run(|tx| {
            let now = tx.now();
            tx.execute::<WorkOrder, _>(id, |wo| wo.work(now))?;
            Ok(())
        })
    }

    pub fn pause(&self, tx: &mut Transaction, id: WorkOrderId, reason: &str) -> Result<()> {
        tx.run(|tx| {
            let now = tx.now();
            tx.execute::<WorkOrder, _>(id, |wo| wo.pause(reason, now))?;
            Ok(())
        })
    }

    #[tracing::instrument(skip(self, tx))]
    pub fn finish(&self, tx: &mut Transaction, id: WorkOrderId) -> Result<()> {
        tx.run(|tx| {
            let (branch, now) = (tx.branch(), tx.now());
            tx.execute::<WorkOrder, _>(id, |wo| wo.finish(branch, now))?;
            metrics::counter!("work_orders_finished_total").increment(1);
            Ok(())
        })
    }

    pub fn reopen(&self, tx: &mut Transaction, id: WorkOrderId, reason: &str) -> Result<()> {
        tx.run(|tx| {
            let now = tx.now();
            tx.execute::<WorkOrder, _>(id, |wo| wo.reopen(reason, now))?;
            Ok(())
        })
    }

    /// Delivers a finished work order.
    #[tracing::instrument(skip(self, tx))]
    pub fn close(&self, tx: &mut Transaction, id: WorkOrderId) -> Result<()> {
        tx.run(|tx| {
            let (branch, now) = (tx.branch(), tx.now());
            tx.execute::<WorkOrder, _>(id, |wo| wo.close(branch, now))?;
            metrics::counter!("work_orders_delivered_total").increment(1);
            tracing::info!(work_order = %id, "work order delivered");
            Ok(())
        })
    }

    pub fn reject(&self, tx: &mut Transaction, id: WorkOrderId, reason: &str) -> Result<()> {
        tx.run(|tx| {
            tx.execute::<WorkOrder, _>(id, |wo| wo.reject(reason))?;
            Ok(())
        })
    }

    pub fn undo_rejection(&self, tx: &mut Transaction, id: WorkOrderId, reason: &str) -> Result<()> {
        tx.run(|tx| {
            tx.execute::<WorkOrder, _>(id, |wo| wo.undo_rejection(reason))?;
            Ok(())
        })
    }

    /// Returns every reservation to stock, then cancels.
    #[tracing::instrument(skip(self, tx))]
    pub fn cancel(
        &self,
        tx: &mut Transaction,
        id: WorkOrderId,
        reason: Option<&str>,
        ignore_sale: bool,
    ) -> Result<CommandResult<WorkOrder>> {
        tx.run(|tx| {
            let now = tx.now();
            let order = tx.load::<WorkOrder>(id)?;
            order.cancel(reason, ignore_sale, now)?;

            for item in order.items.iter().filter(|i| i.quantity_decreased > Decimal::ZERO) {
                self.return_to_stock(tx, id, item.id, item.quantity_decreased)?;
            }

            let result = tx.execute::<WorkOrder, _>(id, |wo| wo.cancel(reason, ignore_sale, now))?;
            metrics::counter!("work_orders_cancelled_total").increment(1);
            tracing::info!(work_order = %id, "work order cancelled");
            Ok(result)
        })
    }

    /// Sends the order away from the transaction's branch.
    pub fn send(&self, tx: &mut Transaction, id: WorkOrderId) -> Result<()> {
        tx.run(|tx| {
            let branch = tx.branch();
            let name = self.branch_name(tx, branch);
            tx.execute::<WorkOrder, _>(id, |wo| wo.send(branch, name))?;
            Ok(())
        })
    }

    /// Receives an order in transit at the transaction's branch.
    pub fn receive(&self, tx: &mut Transaction, id: WorkOrderId) -> Result<()> {
        tx.run(|tx| {
            let branch = tx.branch();
            let name = self.branch_name(tx, branch);
            tx.execute::<WorkOrder, _>(id, |wo| wo.receive(branch, name))?;
            Ok(())
        })
    }

    pub fn add_note(&self, tx: &mut Transaction, id: WorkOrderId, note: &str) -> Result<()> {
        tx.run(|tx| {
            tx.execute::<WorkOrder, _>(id, |wo| wo.add_note(note))?;
            Ok(())
        })
    }

    /// Moves a work order to `target` one step at a time.
    ///
    /// Forward steps run approve, work and finish; backward steps run pause
    /// and reopen and need a reason, checked before any step runs. Nothing
    /// goes back to Opened. Delivered walks to Finished then closes.
    #[tracing::instrument(skip(self, tx))]
    pub fn change_status(
        &self,
        tx: &mut Transaction,
        id: WorkOrderId,
        target: WorkOrderStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        tx.run(|tx| {
            let order = tx.load::<WorkOrder>(id)?;
            if order.status == target {
                return Ok(());
            }
            match target {
                WorkOrderStatus::Cancelled => {
                    self.cancel(tx, id, reason, false)?;
                    Ok(())
                }
                WorkOrderStatus::Delivered => {
                    self.walk(tx, &order, WorkOrderStatus::Finished, reason)?;
                    self.close(tx, id)
                }
                _ => self.walk(tx, &order, target, reason),
            }
        })
    }

    fn walk(
        &self,
        tx: &mut Transaction,
        order: &WorkOrder,
        target: WorkOrderStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        let (Some(from), Some(to)) = (order.status.step(), target.step()) else {
            return Err(DomainError::invalid_status(
                "WorkOrder",
                order.status,
                "change the status of",
            ));
        };
        if to < from {
            if target == WorkOrderStatus::Opened {
                return Err(DomainError::invalid_status(
                    "WorkOrder",
                    order.status,
                    "reopen to Opened",
                ));
            }
            if reason.is_none_or(|r| r.trim().is_empty()) {
                return Err(DomainError::NeedReason {
                    action: "move a work order back",
                });
            }
        }

        let reason = reason.unwrap_or_default();
        let mut step = from;
        while step != to {
            let next = if to > from { step + 1 } else { step - 1 };
            match WorkOrderStatus::from_step(next) {
                Some(WorkOrderStatus::Waiting) if next > step => self.approve(tx, order.id)?,
                Some(WorkOrderStatus::InProgress) if next > step => self.work(tx, order.id)?,
                Some(WorkOrderStatus::Finished) => self.finish(tx, order.id)?,
                Some(WorkOrderStatus::Waiting) => self.pause(tx, order.id, reason)?,
                Some(WorkOrderStatus::InProgress) => self.reopen(tx, order.id, reason)?,
                _ => {
                    return Err(DomainError::invalid_status(
                        "WorkOrder",
                        order.status,
                        "change the status of",
                    ));
                }
            }
            step = next;
        }
        Ok(())
    }

    /// Couples a work order to an opened sale, adding a sale item for
    /// every item not linked yet.
    #[tracing::instrument(skip(self, tx))]
    pub fn link_to_sale(
        &self,
        tx: &mut Transaction,
        work_order_id: WorkOrderId,
        sale_id: SaleId,
    ) -> Result<()> {
        tx.run(|tx| {
            let sale = tx.load::<Sale>(sale_id)?;
            if sale.status() != SaleStatus::Opened {
                return Err(DomainError::invalid_status("Sale", sale.status(), "link a work order to"));
            }
            let result = tx.execute::<WorkOrder, _>(work_order_id, |wo| wo.link_to_sale(sale_id))?;

            for item in result.aggregate.items.iter().filter(|i| i.sale_item_id.is_none()) {
                let sale_item = SaleItem {
                    batch_id: item.batch_id,
                    quantity_decreased: item.quantity_decreased,
                    ..SaleItem::new(item.sellable_id, item.quantity, item.price)
                };
                let sale_item_id = sale_item.id;
                tx.execute::<Sale, _>(sale_id, |sale| sale.add_item(sale_item))?;
                tx.execute::<WorkOrder, _>(work_order_id, |wo| wo.link_item(item.id, sale_item_id))?;
            }
            tracing::info!(work_order = %work_order_id, sale = %sale_id, "work order linked to sale");
            Ok(())
        })
    }

    pub fn history(&self, tx: &Transaction, id: WorkOrderId) -> Vec<HistoryEntry> {
        tx.history(HistorySubject::WorkOrder(id))
    }

    fn branch_name(&self, tx: &Transaction, branch: common::BranchId) -> Option<String> {
        self.catalog.branch(tx, branch).ok().map(|b| b.name)
    }
}
