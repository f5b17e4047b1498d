//! Stock gateway: balances per (sellable, branch, batch) and their history.

use chrono::{DateTime, Utc};
use common::{AggregateId, BatchId, BranchId, Money, SellableId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{CatalogService, Sellable};
use crate::error::{DomainError, Result};
use crate::store::Transaction;

/// Why a balance moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockReason {
    Initial,
    Sale,
    ReturnedSale,
    CancelledSale,
    StockDecrease,
    TransferTo,
    TransferFrom,
    WorkOrderUsed,
    WorkOrderReturnToStock,
    InventoryAdjust,
    ProductionAllocated,
    ProductionProduced,
    Loan,
    ReturnedLoan,
    Imported,
}

impl StockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockReason::Initial => "INITIAL",
            StockReason::Sale => "SALE",
            StockReason::ReturnedSale => "RETURNED_SALE",
            StockReason::CancelledSale => "CANCELLED_SALE",
            StockReason::StockDecrease => "STOCK_DECREASE",
            StockReason::TransferTo => "TRANSFER_TO",
            StockReason::TransferFrom => "TRANSFER_FROM",
            StockReason::WorkOrderUsed => "WORK_ORDER_USED",
            StockReason::WorkOrderReturnToStock => "WORK_ORDER_RETURN_TO_STOCK",
            StockReason::InventoryAdjust => "INVENTORY_ADJUST",
            StockReason::ProductionAllocated => "PRODUCTION_ALLOCATED",
            StockReason::ProductionProduced => "PRODUCTION_PRODUCED",
            StockReason::Loan => "LOAN",
            StockReason::ReturnedLoan => "RETURNED_LOAN",
            StockReason::Imported => "IMPORTED",
        }
    }
}

impl std::fmt::Display for StockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub sellable_id: SellableId,
    pub branch_id: BranchId,
    pub batch_id: Option<BatchId>,
}

/// Current balance of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub key: StockKey,
    pub quantity: Decimal,
    /// Weighted average unit cost.
    pub stock_cost: Money,
}

/// One append-only row per balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransactionHistory {
    pub id: Uuid,
    pub key: StockKey,
    /// Signed: negative for decreases.
    pub quantity: Decimal,
    pub stock_cost: Money,
    pub reason: StockReason,
    pub reference: Option<AggregateId>,
    pub responsible: UserId,
    pub date: DateTime<Utc>,
}

/// A requested balance change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    pub sellable_id: SellableId,
    pub branch_id: BranchId,
    pub batch_id: Option<BatchId>,
    pub quantity: Decimal,
    pub reason: StockReason,
    pub reference: Option<AggregateId>,
    pub unit_cost: Option<Money>,
}

impl StockMovement {
    pub fn new(
        sellable_id: SellableId,
        branch_id: BranchId,
        quantity: Decimal,
        reason: StockReason,
    ) -> Self {
        Self {
            sellable_id,
            branch_id,
            batch_id: None,
            quantity,
            reason,
            reference: None,
            unit_cost: None,
        }
    }

    pub fn batch(mut self, batch_id: Option<BatchId>) -> Self {
        self.batch_id = batch_id;
        self
    }

    pub fn reference(mut self, reference: impl Into<AggregateId>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn unit_cost(mut self, cost: Money) -> Self {
        self.unit_cost = Some(cost);
        self
    }

    fn key(&self) -> StockKey {
        StockKey {
            sellable_id: self.sellable_id,
            branch_id: self.branch_id,
            batch_id: self.batch_id,
        }
    }
}

/// Increases and decreases stock balances.
///
/// Only stock-managed sellables participate; everything else is a no-op.
#[derive(Debug, Clone, Default)]
pub struct StockGateway {
    catalog: CatalogService,
}

impl StockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current balance of a key, zero if never stocked.
    pub fn balance(
        &self,
        tx: &Transaction,
        sellable_id: SellableId,
        branch_id: BranchId,
        batch_id: Option<BatchId>,
    ) -> Decimal {
        let key = StockKey {
            sellable_id,
            branch_id,
            batch_id,
        };
        tx.tables()
            .stock
            .get(&key)
            .map(|item| item.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn stock_item(&self, tx: &Transaction, key: StockKey) -> Option<StockItem> {
        tx.tables().stock.get(&key).cloned()
    }

    /// Balance changes of one sellable, oldest first.
    pub fn history(&self, tx: &Transaction, sellable_id: SellableId) -> Vec<StockTransactionHistory> {
        tx.tables()
            .stock_history
            .iter()
            .filter(|h| h.key.sellable_id == sellable_id)
            .cloned()
            .collect()
    }

    /// Fails if the quantity is not positive.
    #[tracing::instrument(skip(self, tx), fields(sellable = %movement.sellable_id, reason = %movement.reason))]
    pub fn increase_stock(&self, tx: &mut Transaction, movement: StockMovement) -> Result<()> {
        tx.run(|tx| {
            let Some(sellable) = self.participating(tx, &movement)? else {
                return Ok(());
            };

            let key = movement.key();
            let item = tx
                .tables_mut()
                .stock
                .entry(key)
                .or_insert_with(|| StockItem {
                    key,
                    quantity: Decimal::ZERO,
                    stock_cost: Money::zero(),
                });

            if let Some(unit_cost) = movement.unit_cost {
                let new_quantity = item.quantity + movement.quantity;
                if item.quantity > Decimal::ZERO && new_quantity > Decimal::ZERO {
                    let total_cost = item.stock_cost.multiply(item.quantity)
                        + unit_cost.multiply(movement.quantity);
                    item.stock_cost = total_cost
                        .divide(new_quantity)
                        .unwrap_or(unit_cost)
                        .round_internal();
                } else {
                    item.stock_cost = unit_cost;
                }
            }
            item.quantity += movement.quantity;
            let stock_cost = item.stock_cost;

            self.append_history(tx, &movement, movement.quantity, stock_cost)?;
            metrics::counter!("stock_increase_total", "reason" => movement.reason.as_str())
                .increment(1);
            tracing::debug!(code = %sellable.code, quantity = %movement.quantity, "stock increased");
            Ok(())
        })
    }

    /// Fails with `InsufficientStock` before anything is written if the
    /// balance is below the quantity.
    #[tracing::instrument(skip(self, tx), fields(sellable = %movement.sellable_id, reason = %movement.reason))]
    pub fn decrease_stock(&self, tx: &mut Transaction, movement: StockMovement) -> Result<()> {
        tx.run(|tx| {
            let Some(sellable) = self.participating(tx, &movement)? else {
                return Ok(());
            };

            let key = movement.key();
            let available = self.balance(tx, key.sellable_id, key.branch_id, key.batch_id);
            if available < movement.quantity {
                return Err(DomainError::InsufficientStock {
                    sellable: sellable.code,
                    requested: movement.quantity,
                    available,
                });
            }

            let stock_cost = match tx.tables_mut().stock.get_mut(&key) {
                Some(item) => {
                    item.quantity -= movement.quantity;
                    item.stock_cost
                }
                None => {
                    return Err(DomainError::DatabaseInconsistency(format!(
                        "positive balance without a stock item for {}",
                        sellable.code
                    )));
                }
            };

            self.append_history(tx, &movement, -movement.quantity, stock_cost)?;
            metrics::counter!("stock_decrease_total", "reason" => movement.reason.as_str())
                .increment(1);
            tracing::debug!(code = %sellable.code, quantity = %movement.quantity, "stock decreased");
            Ok(())
        })
    }

    /// Moves stock between branches, keeping the unit cost.
    pub fn transfer(
        &self,
        tx: &mut Transaction,
        sellable_id: SellableId,
        from: BranchId,
        to: BranchId,
        batch_id: Option<BatchId>,
        quantity: Decimal,
    ) -> Result<()> {
        tx.run(|tx| {
            if from == to {
                return Err(DomainError::InvalidValue(
                    "cannot transfer stock to the same branch".to_string(),
                ));
            }
            let key = StockKey {
                sellable_id,
                branch_id: from,
                batch_id,
            };
            let cost = self.stock_item(tx, key).map(|item| item.stock_cost);

            self.decrease_stock(
                tx,
                StockMovement::new(sellable_id, from, quantity, StockReason::TransferTo).batch(batch_id),
            )?;
            let mut incoming =
                StockMovement::new(sellable_id, to, quantity, StockReason::TransferFrom).batch(batch_id);
            if let Some(cost) = cost {
                incoming = incoming.unit_cost(cost);
            }
            self.increase_stock(tx, incoming)
        })
    }

    /// The sellable when it takes part in stock, after validating the movement.
    fn participating(&self, tx: &Transaction, movement: &StockMovement) -> Result<Option<Sellable>> {
        if movement.quantity <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(movement.quantity));
        }
        let sellable = self.catalog.sellable(tx, movement.sellable_id)?;
        let Some(storable) = sellable.managed_storable()? else {
            return Ok(None);
        };
        if storable.is_batch && movement.batch_id.is_none() {
            return Err(DomainError::MissingBatch);
        }
        Ok(Some(sellable))
    }

    fn append_history(
        &self,
        tx: &mut Transaction,
        movement: &StockMovement,
        signed_quantity: Decimal,
        stock_cost: Money,
    ) -> Result<()> {
        let row = StockTransactionHistory {
            id: Uuid::new_v4(),
            key: movement.key(),
            quantity: signed_quantity,
            stock_cost,
            reason: movement.reason,
            reference: movement.reference,
            responsible: tx.actor(),
            date: tx.now(),
        };
        tx.record(
            "stock_transaction_history",
            "Sellable",
            movement.sellable_id.into(),
            &row,
        )?;
        tx.tables_mut().stock_history.push(row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use journal::InMemoryJournal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::catalog::Sellable;
    use crate::clock::SystemClock;
    use crate::events::EventBus;
    use crate::store::{Database, SessionContext};

    async fn begin() -> (Transaction, BranchId) {
        let db = Database::new(
            Arc::new(InMemoryJournal::new()),
            Arc::new(SystemClock),
            EventBus::new(),
        );
        let branch = BranchId::new();
        (
            db.begin(SessionContext::new(UserId::new(), branch)).await,
            branch,
        )
    }

    fn add(tx: &mut Transaction, sellable: Sellable) -> SellableId {
        CatalogService.add_sellable(tx, sellable).unwrap()
    }

    #[tokio::test]
    async fn increase_then_decrease() {
        let (mut tx, branch) = begin().await;
        let gateway = StockGateway::new();
        let p = add(&mut tx, Sellable::product("P", "Widget", Money::from_cents(1000)));

        gateway
            .increase_stock(&mut tx, StockMovement::new(p, branch, dec!(10), StockReason::Initial))
            .unwrap();
        gateway
            .decrease_stock(&mut tx, StockMovement::new(p, branch, dec!(3), StockReason::Sale))
            .unwrap();

        assert_eq!(gateway.balance(&tx, p, branch, None), dec!(7));
        let history = gateway.history(&tx, p);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].quantity, dec!(-3));
        assert_eq!(history[1].reason, StockReason::Sale);
    }

    #[tokio::test]
    async fn non_positive_quantity_is_rejected() {
        let (mut tx, branch) = begin().await;
        let gateway = StockGateway::new();
        let p = add(&mut tx, Sellable::product("P", "Widget", Money::from_cents(1000)));

        let result = gateway
            .increase_stock(&mut tx, StockMovement::new(p, branch, dec!(0), StockReason::Initial));
        assert!(matches!(result, Err(DomainError::InvalidQuantity(_))));
    }

    #[tokio::test]
    async fn insufficient_stock_writes_nothing() {
        let (mut tx, branch) = begin().await;
        let gateway = StockGateway::new();
        let p = add(&mut tx, Sellable::product("P", "Widget", Money::from_cents(1000)));
        gateway
            .increase_stock(&mut tx, StockMovement::new(p, branch, dec!(2), StockReason::Initial))
            .unwrap();
        let pending = tx.pending_records();

        let result =
            gateway.decrease_stock(&mut tx, StockMovement::new(p, branch, dec!(5), StockReason::Sale));
        assert!(matches!(result, Err(DomainError::InsufficientStock { .. })));
        assert!(tx.is_aborted());
        assert_eq!(gateway.balance(&tx, p, branch, None), dec!(2));
        assert_eq!(gateway.history(&tx, p).len(), 1);
        assert_eq!(tx.pending_records(), pending);
    }

    #[tokio::test]
    async fn services_are_no_ops() {
        let (mut tx, branch) = begin().await;
        let gateway = StockGateway::new();
        let s = add(&mut tx, Sellable::service("S", "Labour", Money::from_cents(1000)));

        gateway
            .decrease_stock(&mut tx, StockMovement::new(s, branch, dec!(5), StockReason::Sale))
            .unwrap();
        assert_eq!(gateway.balance(&tx, s, branch, None), Decimal::ZERO);
        assert!(gateway.history(&tx, s).is_empty());
    }

    #[tokio::test]
    async fn batch_products_need_a_batch() {
        let (mut tx, branch) = begin().await;
        let gateway = StockGateway::new();
        let p = add(&mut tx, Sellable::batch_product("L", "Lens", Money::from_cents(1000)));
        let batch = CatalogService.add_batch(&mut tx, p, "B-1").unwrap();

        gateway
            .increase_stock(
                &mut tx,
                StockMovement::new(p, branch, dec!(4), StockReason::Initial).batch(Some(batch)),
            )
            .unwrap();
        assert_eq!(gateway.balance(&tx, p, branch, Some(batch)), dec!(4));
        assert_eq!(gateway.balance(&tx, p, branch, None), Decimal::ZERO);

        let missing = gateway
            .increase_stock(&mut tx, StockMovement::new(p, branch, dec!(1), StockReason::Initial));
        assert!(matches!(missing, Err(DomainError::MissingBatch)));
        assert!(tx.is_aborted());
    }

    #[tokio::test]
    async fn weighted_average_cost() {
        let (mut tx, branch) = begin().await;
        let gateway = StockGateway::new();
        let p = add(&mut tx, Sellable::product("P", "Widget", Money::from_cents(1000)));

        gateway
            .increase_stock(
                &mut tx,
                StockMovement::new(p, branch, dec!(10), StockReason::Initial)
                    .unit_cost(Money::from_cents(400)),
            )
            .unwrap();
        gateway
            .increase_stock(
                &mut tx,
                StockMovement::new(p, branch, dec!(10), StockReason::Initial)
                    .unit_cost(Money::from_cents(600)),
            )
            .unwrap();

        let key = StockKey {
            sellable_id: p,
            branch_id: branch,
            batch_id: None,
        };
        assert_eq!(
            gateway.stock_item(&tx, key).unwrap().stock_cost,
            Money::from_cents(500)
        );
    }

    #[tokio::test]
    async fn transfer_moves_between_branches() {
        let (mut tx, branch) = begin().await;
        let other = BranchId::new();
        let gateway = StockGateway::new();
        let p = add(&mut tx, Sellable::product("P", "Widget", Money::from_cents(1000)));
        gateway
            .increase_stock(&mut tx, StockMovement::new(p, branch, dec!(5), StockReason::Initial))
            .unwrap();

        gateway.transfer(&mut tx, p, branch, other, None, dec!(2)).unwrap();

        assert_eq!(gateway.balance(&tx, p, branch, None), dec!(3));
        assert_eq!(gateway.balance(&tx, p, other, None), dec!(2));
        let reasons: Vec<_> = gateway.history(&tx, p).iter().map(|h| h.reason).collect();
        assert_eq!(
            reasons,
            vec![
                StockReason::Initial,
                StockReason::TransferTo,
                StockReason::TransferFrom
            ]
        );
    }
}
