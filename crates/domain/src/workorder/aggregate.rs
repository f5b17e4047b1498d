//! Work order aggregate implementation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{
    BatchId, BranchId, ClientId, Money, SaleId, SaleItemId, SellableId, WorkOrderId,
    WorkOrderItemId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::command::Stored;
use crate::error::{DomainError, Result};
use crate::events::CoreEvent;
use crate::history::HistorySubject;
use crate::store::Tables;

use super::events::WorkOrderStatusChangedData;
use super::{WorkOrderEvent, WorkOrderStatus};

/// A product or service used by a work order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderItem {
    pub id: WorkOrderItemId,
    pub sellable_id: SellableId,
    pub quantity: Decimal,
    /// Stock reserved for this item, `0..=quantity`.
    pub quantity_decreased: Decimal,
    pub price: Money,
    pub batch_id: Option<BatchId>,
    pub sale_item_id: Option<SaleItemId>,
    /// Whether the sellable took part in stock when the item was added.
    pub manages_stock: bool,
}

impl WorkOrderItem {
    pub fn new(sellable_id: SellableId, quantity: Decimal, price: Money, manages_stock: bool) -> Self {
        Self {
            id: WorkOrderItemId::new(),
            sellable_id,
            quantity,
            quantity_decreased: Decimal::ZERO,
            price,
            batch_id: None,
            sale_item_id: None,
            manages_stock,
        }
    }

    pub fn total(&self) -> Money {
        self.price.multiply(self.quantity).round()
    }

    pub fn remaining_to_reserve(&self) -> Decimal {
        self.quantity - self.quantity_decreased
    }

    pub fn is_totally_reserved(&self) -> bool {
        self.quantity_decreased >= self.quantity
    }
}

/// Work order aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub(crate) id: WorkOrderId,
    pub(crate) identifier: i64,
    pub(crate) description: String,
    pub(crate) branch_id: BranchId,
    /// `None` while in transit between branches.
    pub(crate) current_branch: Option<BranchId>,
    pub(crate) execution_branch: Option<BranchId>,
    pub(crate) status: WorkOrderStatus,
    pub(crate) is_rejected: bool,
    pub(crate) client_id: Option<ClientId>,
    pub(crate) sale_id: Option<SaleId>,
    pub(crate) items: Vec<WorkOrderItem>,
    pub(crate) notes: Vec<String>,
    pub(crate) open_date: DateTime<Utc>,
    pub(crate) approve_date: Option<DateTime<Utc>>,
    pub(crate) finish_date: Option<DateTime<Utc>>,
    pub(crate) close_date: Option<DateTime<Utc>>,
    pub(crate) cancel_date: Option<DateTime<Utc>>,
}

impl WorkOrder {
    pub(crate) fn new(
        identifier: i64,
        description: impl Into<String>,
        branch_id: BranchId,
        client_id: Option<ClientId>,
        open_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WorkOrderId::new(),
            identifier,
            description: description.into(),
            branch_id,
            current_branch: Some(branch_id),
            execution_branch: None,
            status: WorkOrderStatus::Opened,
            is_rejected: false,
            client_id,
            sale_id: None,
            items: Vec::new(),
            notes: Vec::new(),
            open_date,
            approve_date: None,
            finish_date: None,
            close_date: None,
            cancel_date: None,
        }
    }
}

impl Aggregate for WorkOrder {
    type Id = WorkOrderId;
    type Event = WorkOrderEvent;

    fn aggregate_type() -> &'static str {
        "WorkOrder"
    }

    fn id(&self) -> WorkOrderId {
        self.id
    }

    fn apply(&mut self, event: WorkOrderEvent) {
        match event {
            WorkOrderEvent::ItemAdded(item) => self.items.push(item),
            WorkOrderEvent::ItemStockChanged {
                item_id,
                quantity_decreased,
            } => {
                if let Some(item) = self.item_mut(item_id) {
                    item.quantity_decreased = quantity_decreased;
                }
            }
            WorkOrderEvent::ItemBatchSet {
                item_id,
                batch_id,
                quantity,
            } => {
                if let Some(item) = self.item_mut(item_id) {
                    item.batch_id = Some(batch_id);
                    item.quantity = quantity;
                }
            }
            WorkOrderEvent::ItemLinked {
                item_id,
                sale_item_id,
            } => {
                if let Some(item) = self.item_mut(item_id) {
                    item.sale_item_id = Some(sale_item_id);
                }
            }
            WorkOrderEvent::LinkedToSale { sale_id } => self.sale_id = Some(sale_id),
            WorkOrderEvent::StatusChanged(data) => self.apply_status_changed(data),
            WorkOrderEvent::RejectionChanged { is_rejected, .. } => self.is_rejected = is_rejected,
            WorkOrderEvent::CurrentBranchChanged { new, .. } => self.current_branch = new,
            WorkOrderEvent::NoteAdded { note } => self.notes.push(note),
        }
    }
}

impl Stored for WorkOrder {
    fn rows(tables: &Tables) -> &HashMap<WorkOrderId, Self> {
        &tables.work_orders
    }

    fn rows_mut(tables: &mut Tables) -> &mut HashMap<WorkOrderId, Self> {
        &mut tables.work_orders
    }

    fn history_subject(&self) -> Option<HistorySubject> {
        Some(HistorySubject::WorkOrder(self.id))
    }

    fn notification(&self, event: &WorkOrderEvent) -> Option<CoreEvent> {
        match event {
            WorkOrderEvent::StatusChanged(data) => Some(CoreEvent::WorkOrderStatusChanged {
                work_order_id: self.id,
                old: data.old,
                new: data.new,
            }),
            _ => None,
        }
    }
}

// Query methods
impl WorkOrder {
    pub fn identifier(&self) -> i64 {
        self.identifier
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn branch_id(&self) -> BranchId {
        self.branch_id
    }

    pub fn current_branch(&self) -> Option<BranchId> {
        self.current_branch
    }

    pub fn execution_branch(&self) -> Option<BranchId> {
        self.execution_branch
    }

    pub fn status(&self) -> WorkOrderStatus {
        self.status
    }

    pub fn is_rejected(&self) -> bool {
        self.is_rejected
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn sale_id(&self) -> Option<SaleId> {
        self.sale_id
    }

    pub fn items(&self) -> &[WorkOrderItem] {
        &self.items
    }

    pub fn item(&self, id: WorkOrderItemId) -> Result<&WorkOrderItem> {
        self.items
            .iter()
            .find(|i| i.id == id)
            .ok_or_else(|| DomainError::not_found("WorkOrderItem", id))
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn open_date(&self) -> DateTime<Utc> {
        self.open_date
    }

    pub fn approve_date(&self) -> Option<DateTime<Utc>> {
        self.approve_date
    }

    pub fn finish_date(&self) -> Option<DateTime<Utc>> {
        self.finish_date
    }

    pub fn close_date(&self) -> Option<DateTime<Utc>> {
        self.close_date
    }

    pub fn cancel_date(&self) -> Option<DateTime<Utc>> {
        self.cancel_date
    }

    pub fn total(&self) -> Money {
        self.items.iter().map(WorkOrderItem::total).sum()
    }

    /// Every stock-managed item holds its full quantity.
    pub fn is_items_totally_reserved(&self) -> bool {
        self.items
            .iter()
            .filter(|i| i.manages_stock)
            .all(WorkOrderItem::is_totally_reserved)
    }

    fn item_mut(&mut self, id: WorkOrderItemId) -> Option<&mut WorkOrderItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    fn apply_status_changed(&mut self, data: WorkOrderStatusChangedData) {
        self.status = data.new;
        match data.new {
            WorkOrderStatus::Waiting if self.approve_date.is_none() => {
                self.approve_date = Some(data.date)
            }
            WorkOrderStatus::Finished => {
                self.finish_date = Some(data.date);
                if self.execution_branch.is_none() {
                    self.execution_branch = data.execution_branch;
                }
            }
            WorkOrderStatus::Delivered => self.close_date = Some(data.date),
            WorkOrderStatus::Cancelled => self.cancel_date = Some(data.date),
            _ => {}
        }
    }

    fn status_changed(
        &self,
        new: WorkOrderStatus,
        now: DateTime<Utc>,
        reason: Option<&str>,
    ) -> WorkOrderEvent {
        WorkOrderEvent::StatusChanged(WorkOrderStatusChangedData {
            old: self.status,
            new,
            date: now,
            reason: reason.map(str::to_string),
            execution_branch: None,
        })
    }

    fn ensure_status(&self, allowed: &[WorkOrderStatus], action: &'static str) -> Result<()> {
        if !allowed.contains(&self.status) {
            return Err(DomainError::invalid_status("WorkOrder", self.status, action));
        }
        Ok(())
    }

    fn ensure_not_rejected(&self, action: &'static str) -> Result<()> {
        if self.is_rejected {
            return Err(DomainError::invalid_status("WorkOrder", "rejected", action));
        }
        Ok(())
    }

    pub(crate) fn ensure_at(&self, branch: BranchId) -> Result<()> {
        if self.current_branch != Some(branch) {
            return Err(DomainError::WrongBranch);
        }
        Ok(())
    }
}

fn require_reason(reason: &str, action: &'static str) -> Result<()> {
    if reason.trim().is_empty() {
        return Err(DomainError::NeedReason { action });
    }
    Ok(())
}

// Command methods
impl WorkOrder {
    pub fn add_item(&self, item: WorkOrderItem) -> Result<Vec<WorkOrderEvent>> {
        if !self.status.can_edit_items() {
            return Err(DomainError::invalid_status("WorkOrder", self.status, "add items to"));
        }
        if item.quantity <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(item.quantity));
        }
        Ok(vec![WorkOrderEvent::ItemAdded(item)])
    }

    /// Validates a reservation and returns the new reserved quantity.
    pub fn reserve(&self, item_id: WorkOrderItemId, quantity: Decimal) -> Result<Vec<WorkOrderEvent>> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_status("WorkOrder", self.status, "reserve items of"));
        }
        if quantity <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(quantity));
        }
        let item = self.item(item_id)?;
        let remaining = item.remaining_to_reserve();
        if remaining <= Decimal::ZERO {
            return Err(DomainError::AlreadyReserved);
        }
        if quantity > remaining {
            return Err(DomainError::OverReserve {
                requested: quantity,
                remaining,
            });
        }
        Ok(vec![WorkOrderEvent::ItemStockChanged {
            item_id,
            quantity_decreased: item.quantity_decreased + quantity,
        }])
    }

    pub fn return_to_stock(
        &self,
        item_id: WorkOrderItemId,
        quantity: Decimal,
    ) -> Result<Vec<WorkOrderEvent>> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_status(
                "WorkOrder",
                self.status,
                "return items of",
            ));
        }
        if quantity <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(quantity));
        }
        let item = self.item(item_id)?;
        if quantity > item.quantity_decreased {
            return Err(DomainError::OverReturn {
                requested: quantity,
                reserved: item.quantity_decreased,
            });
        }
        Ok(vec![WorkOrderEvent::ItemStockChanged {
            item_id,
            quantity_decreased: item.quantity_decreased - quantity,
        }])
    }

    /// Mirrors the stock a linked sale item holds.
    pub fn set_item_decreased(
        &self,
        item_id: WorkOrderItemId,
        quantity_decreased: Decimal,
    ) -> Result<Vec<WorkOrderEvent>> {
        let item = self.item(item_id)?;
        if quantity_decreased < Decimal::ZERO || quantity_decreased > item.quantity {
            return Err(DomainError::InvalidQuantity(quantity_decreased));
        }
        if item.quantity_decreased == quantity_decreased {
            return Ok(Vec::new());
        }
        Ok(vec![WorkOrderEvent::ItemStockChanged {
            item_id,
            quantity_decreased,
        }])
    }

    pub fn set_item_batch(
        &self,
        item_id: WorkOrderItemId,
        batch_id: BatchId,
        quantity: Decimal,
    ) -> Result<Vec<WorkOrderEvent>> {
        let item = self.item(item_id)?;
        if !item.quantity_decreased.is_zero() {
            return Err(DomainError::InvalidValue(
                "cannot change the batch of a reserved item".to_string(),
            ));
        }
        Ok(vec![WorkOrderEvent::ItemBatchSet {
            item_id,
            batch_id,
            quantity,
        }])
    }

    pub fn link_to_sale(&self, sale_id: SaleId) -> Result<Vec<WorkOrderEvent>> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_status("WorkOrder", self.status, "link"));
        }
        match self.sale_id {
            Some(current) if current == sale_id => Ok(Vec::new()),
            Some(_) => Err(DomainError::InvalidValue(
                "work order is already linked to another sale".to_string(),
            )),
            None => Ok(vec![WorkOrderEvent::LinkedToSale { sale_id }]),
        }
    }

    pub fn link_item(
        &self,
        item_id: WorkOrderItemId,
        sale_item_id: SaleItemId,
    ) -> Result<Vec<WorkOrderEvent>> {
        if self.item(item_id)?.sale_item_id.is_some() {
            return Err(DomainError::InvalidValue(
                "work order item is already linked".to_string(),
            ));
        }
        Ok(vec![WorkOrderEvent::ItemLinked {
            item_id,
            sale_item_id,
        }])
    }

    /// Opened → Waiting.
    pub fn approve(&self, now: DateTime<Utc>) -> Result<Vec<WorkOrderEvent>> {
        self.ensure_status(&[WorkOrderStatus::Opened], "approve")?;
        Ok(vec![self.status_changed(WorkOrderStatus::Waiting, now, None)])
    }

    /// Waiting → InProgress.
    pub fn work(&self, now: DateTime<Utc>) -> Result<Vec<WorkOrderEvent>> {
        self.ensure_status(&[WorkOrderStatus::Waiting], "start work on")?;
        self.ensure_not_rejected("start work on")?;
        Ok(vec![self.status_changed(WorkOrderStatus::InProgress, now, None)])
    }

    /// InProgress → Waiting.
    pub fn pause(&self, reason: &str, now: DateTime<Utc>) -> Result<Vec<WorkOrderEvent>> {
        require_reason(reason, "pause a work order")?;
        self.ensure_status(&[WorkOrderStatus::InProgress], "pause")?;
        self.ensure_not_rejected("pause")?;
        Ok(vec![self.status_changed(WorkOrderStatus::Waiting, now, Some(reason))])
    }

    /// Waiting or InProgress → Finished, at the branch holding the order.
    pub fn finish(&self, branch: BranchId, now: DateTime<Utc>) -> Result<Vec<WorkOrderEvent>> {
        self.ensure_status(
            &[WorkOrderStatus::Waiting, WorkOrderStatus::InProgress],
            "finish",
        )?;
        self.ensure_not_rejected("finish")?;
        self.ensure_at(branch)?;
        Ok(vec![WorkOrderEvent::StatusChanged(WorkOrderStatusChangedData {
            old: self.status,
            new: WorkOrderStatus::Finished,
            date: now,
            reason: None,
            execution_branch: Some(branch),
        })])
    }

    /// Finished → InProgress.
    pub fn reopen(&self, reason: &str, now: DateTime<Utc>) -> Result<Vec<WorkOrderEvent>> {
        require_reason(reason, "reopen a work order")?;
        self.ensure_status(&[WorkOrderStatus::Finished], "reopen")?;
        Ok(vec![self.status_changed(WorkOrderStatus::InProgress, now, Some(reason))])
    }

    /// Finished → Delivered. Needs a coupled sale or every item reserved.
    pub fn close(&self, branch: BranchId, now: DateTime<Utc>) -> Result<Vec<WorkOrderEvent>> {
        self.ensure_status(&[WorkOrderStatus::Finished], "close")?;
        self.ensure_not_rejected("close")?;
        self.ensure_at(branch)?;
        if self.sale_id.is_none() && !self.is_items_totally_reserved() {
            return Err(DomainError::NotFullyReserved);
        }
        Ok(vec![self.status_changed(WorkOrderStatus::Delivered, now, None)])
    }

    pub fn reject(&self, reason: &str) -> Result<Vec<WorkOrderEvent>> {
        require_reason(reason, "reject a work order")?;
        if !self.status.can_reject() {
            return Err(DomainError::invalid_status("WorkOrder", self.status, "reject"));
        }
        self.ensure_not_rejected("reject")?;
        Ok(vec![WorkOrderEvent::RejectionChanged {
            is_rejected: true,
            reason: reason.to_string(),
        }])
    }

    pub fn undo_rejection(&self, reason: &str) -> Result<Vec<WorkOrderEvent>> {
        require_reason(reason, "undo a rejection")?;
        if !self.is_rejected {
            return Err(DomainError::invalid_status(
                "WorkOrder",
                "not rejected",
                "undo the rejection of",
            ));
        }
        Ok(vec![WorkOrderEvent::RejectionChanged {
            is_rejected: false,
            reason: reason.to_string(),
        }])
    }

    /// → Cancelled. Reserved stock must be returned before applying.
    pub fn cancel(
        &self,
        reason: Option<&str>,
        ignore_sale: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkOrderEvent>> {
        if !self.status.can_cancel() {
            return Err(DomainError::invalid_status("WorkOrder", self.status, "cancel"));
        }
        let reason = reason.filter(|r| !r.trim().is_empty());
        if reason.is_none() && self.status != WorkOrderStatus::Opened {
            return Err(DomainError::NeedReason {
                action: "cancel a work order",
            });
        }
        if self.sale_id.is_some() && !ignore_sale {
            return Err(DomainError::HasCoupledSale);
        }
        Ok(vec![self.status_changed(WorkOrderStatus::Cancelled, now, reason)])
    }

    /// Puts the order in transit.
    pub fn send(
        &self,
        from: BranchId,
        from_name: Option<String>,
    ) -> Result<Vec<WorkOrderEvent>> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_status("WorkOrder", self.status, "send"));
        }
        self.ensure_at(from)?;
        Ok(vec![WorkOrderEvent::CurrentBranchChanged {
            old: Some(from),
            new: None,
            old_name: from_name,
            new_name: None,
        }])
    }

    /// Takes an order out of transit at `to`.
    pub fn receive(&self, to: BranchId, to_name: Option<String>) -> Result<Vec<WorkOrderEvent>> {
        if self.current_branch.is_some() {
            return Err(DomainError::InvalidValue(
                "work order is not in transit".to_string(),
            ));
        }
        Ok(vec![WorkOrderEvent::CurrentBranchChanged {
            old: None,
            new: Some(to),
            old_name: None,
            new_name: to_name,
        }])
    }

    pub fn add_note(&self, note: &str) -> Result<Vec<WorkOrderEvent>> {
        if note.trim().is_empty() {
            return Err(DomainError::InvalidValue("empty note".to_string()));
        }
        Ok(vec![WorkOrderEvent::NoteAdded {
            note: note.to_string(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 10, 0, 0).unwrap()
    }

    fn order() -> WorkOrder {
        WorkOrder::new(1, "Fix the lens", BranchId::new(), None, now())
    }

    fn step(
        order: &mut WorkOrder,
        command: impl FnOnce(&WorkOrder) -> Result<Vec<WorkOrderEvent>>,
    ) -> Result<()> {
        let events = command(order)?;
        order.apply_events(events);
        Ok(())
    }

    fn with_item(order: &mut WorkOrder, quantity: Decimal) -> WorkOrderItemId {
        let item = WorkOrderItem::new(SellableId::new(), quantity, Money::from_cents(1000), true);
        let id = item.id;
        step(order, |o| o.add_item(item)).unwrap();
        id
    }

    #[test]
    fn test_happy_path_to_delivered() {
        let mut order = order();
        let branch = order.branch_id();
        let item = with_item(&mut order, dec!(2));

        step(&mut order, |o| o.approve(now())).unwrap();
        step(&mut order, |o| o.work(now())).unwrap();
        step(&mut order, |o| o.reserve(item, dec!(2))).unwrap();
        step(&mut order, |o| o.finish(branch, now())).unwrap();
        assert_eq!(order.execution_branch(), Some(branch));
        step(&mut order, |o| o.close(branch, now())).unwrap();

        assert_eq!(order.status(), WorkOrderStatus::Delivered);
        assert_eq!(order.close_date(), Some(now()));
    }

    #[test]
    fn test_reserve_bounds() {
        let mut order = order();
        let item = with_item(&mut order, dec!(5));

        assert!(matches!(
            order.reserve(item, dec!(6)),
            Err(DomainError::OverReserve { .. })
        ));
        step(&mut order, |o| o.reserve(item, dec!(5))).unwrap();
        assert!(matches!(
            order.reserve(item, dec!(1)),
            Err(DomainError::AlreadyReserved)
        ));
        assert!(matches!(
            order.return_to_stock(item, dec!(6)),
            Err(DomainError::OverReturn { .. })
        ));
        step(&mut order, |o| o.return_to_stock(item, dec!(5))).unwrap();
        assert_eq!(order.item(item).unwrap().quantity_decreased, Decimal::ZERO);
    }

    #[test]
    fn test_close_needs_reservations_or_a_sale() {
        let mut order = order();
        let branch = order.branch_id();
        with_item(&mut order, dec!(1));
        step(&mut order, |o| o.approve(now())).unwrap();
        step(&mut order, |o| o.finish(branch, now())).unwrap();

        assert!(matches!(
            order.close(branch, now()),
            Err(DomainError::NotFullyReserved)
        ));
        step(&mut order, |o| o.link_to_sale(SaleId::new())).unwrap();
        assert!(order.close(branch, now()).is_ok());
    }

    #[test]
    fn test_services_do_not_block_close() {
        let mut order = order();
        let branch = order.branch_id();
        let service = WorkOrderItem::new(SellableId::new(), dec!(1), Money::from_cents(5000), false);
        step(&mut order, |o| o.add_item(service)).unwrap();
        step(&mut order, |o| o.approve(now())).unwrap();
        step(&mut order, |o| o.finish(branch, now())).unwrap();
        assert!(order.close(branch, now()).is_ok());
    }

    #[test]
    fn test_rejection_blocks_work() {
        let mut order = order();
        step(&mut order, |o| o.approve(now())).unwrap();
        assert!(matches!(order.reject(""), Err(DomainError::NeedReason { .. })));
        step(&mut order, |o| o.reject("client refused the quote")).unwrap();
        assert!(order.is_rejected());
        assert!(order.work(now()).is_err());
        assert!(order.reject("again").is_err());

        step(&mut order, |o| o.undo_rejection("client changed mind")).unwrap();
        assert!(order.work(now()).is_ok());
    }

    #[test]
    fn test_cancel_rules() {
        let mut order = order();
        assert!(order.cancel(None, false, now()).is_ok());

        step(&mut order, |o| o.approve(now())).unwrap();
        assert!(matches!(
            order.cancel(None, false, now()),
            Err(DomainError::NeedReason { .. })
        ));

        step(&mut order, |o| o.link_to_sale(SaleId::new())).unwrap();
        assert!(matches!(
            order.cancel(Some("no parts"), false, now()),
            Err(DomainError::HasCoupledSale)
        ));
        assert!(order.cancel(Some("no parts"), true, now()).is_ok());
    }

    #[test]
    fn test_finish_needs_the_holding_branch() {
        let mut order = order();
        let branch = order.branch_id();
        let other = BranchId::new();
        step(&mut order, |o| o.approve(now())).unwrap();
        step(&mut order, |o| o.send(branch, None)).unwrap();
        assert_eq!(order.current_branch(), None);
        assert!(matches!(
            order.finish(branch, now()),
            Err(DomainError::WrongBranch)
        ));

        step(&mut order, |o| o.receive(other, None)).unwrap();
        step(&mut order, |o| o.finish(other, now())).unwrap();
        assert_eq!(order.execution_branch(), Some(other));
    }

    #[test]
    fn test_reopen_keeps_first_execution_branch() {
        let mut order = order();
        let branch = order.branch_id();
        step(&mut order, |o| o.approve(now())).unwrap();
        step(&mut order, |o| o.finish(branch, now())).unwrap();
        assert!(matches!(
            order.reopen(" ", now()),
            Err(DomainError::NeedReason { .. })
        ));
        step(&mut order, |o| o.reopen("forgot a part", now())).unwrap();
        assert_eq!(order.status(), WorkOrderStatus::InProgress);

        step(&mut order, |o| o.send(branch, None)).unwrap();
        let other = BranchId::new();
        step(&mut order, |o| o.receive(other, None)).unwrap();
        step(&mut order, |o| o.finish(other, now())).unwrap();
        assert_eq!(order.execution_branch(), Some(branch));
    }
}
