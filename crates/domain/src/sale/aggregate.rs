//! Sale aggregate implementation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{
    BatchId, BranchId, ClientId, Money, PaymentGroupId, PaymentId, ReturnedSaleId, SaleId,
    SaleItemId, SalesPersonId, SellableId, TillId, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::command::Stored;
use crate::error::{DomainError, Result};
use crate::events::CoreEvent;
use crate::history::HistorySubject;
use crate::store::Tables;

use super::events::SaleStatusChangedData;
use super::{SaleEvent, SaleStatus};

/// A line of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: SaleItemId,
    pub sellable_id: SellableId,
    pub quantity: Decimal,
    pub price: Money,
    /// Stock already taken for this line, `0..=quantity`.
    pub quantity_decreased: Decimal,
    /// Sum of every return of this line.
    pub returned_quantity: Decimal,
    pub batch_id: Option<BatchId>,
}

impl SaleItem {
    pub fn new(sellable_id: SellableId, quantity: Decimal, price: Money) -> Self {
        Self {
            id: SaleItemId::new(),
            sellable_id,
            quantity,
            price,
            quantity_decreased: Decimal::ZERO,
            returned_quantity: Decimal::ZERO,
            batch_id: None,
        }
    }

    pub fn total(&self) -> Money {
        self.price.multiply(self.quantity).round()
    }

    /// Quantity that may still be returned.
    pub fn returnable_quantity(&self) -> Decimal {
        self.quantity - self.returned_quantity
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnedSaleItem {
    pub sale_item_id: SaleItemId,
    pub sellable_id: SellableId,
    pub batch_id: Option<BatchId>,
    pub quantity: Decimal,
    pub price: Money,
}

impl ReturnedSaleItem {
    pub fn total(&self) -> Money {
        self.price.multiply(self.quantity).round()
    }
}

/// A partial or full reversal of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnedSale {
    pub id: ReturnedSaleId,
    pub identifier: i64,
    pub sale_id: SaleId,
    pub items: Vec<ReturnedSaleItem>,
    pub reason: String,
    /// Amount paid back to the client.
    pub refund_value: Money,
    pub refund_group: Option<PaymentGroupId>,
    pub date: DateTime<Utc>,
    pub responsible: UserId,
}

impl ReturnedSale {
    pub fn returned_total(&self) -> Money {
        self.items.iter().map(ReturnedSaleItem::total).sum()
    }
}

/// Commission earned by a salesperson on one received payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commission {
    pub sale_id: SaleId,
    pub payment_id: PaymentId,
    pub salesperson_id: SalesPersonId,
    pub value: Money,
    pub date: DateTime<Utc>,
}

/// Sale aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub(crate) id: SaleId,
    pub(crate) identifier: i64,
    pub(crate) branch_id: BranchId,
    pub(crate) status: SaleStatus,
    pub(crate) items: Vec<SaleItem>,
    pub(crate) group_id: PaymentGroupId,
    pub(crate) salesperson_id: SalesPersonId,
    pub(crate) client_id: Option<ClientId>,
    pub(crate) till_id: Option<TillId>,
    pub(crate) surcharge: Money,
    pub(crate) discount: Money,
    pub(crate) open_date: DateTime<Utc>,
    pub(crate) confirm_date: Option<DateTime<Utc>>,
    pub(crate) paid_date: Option<DateTime<Utc>>,
    pub(crate) cancel_date: Option<DateTime<Utc>>,
    pub(crate) return_date: Option<DateTime<Utc>>,
    pub(crate) returned_sales: Vec<ReturnedSale>,
    pub(crate) renegotiation_group: Option<PaymentGroupId>,
}

impl Sale {
    pub(crate) fn new(
        identifier: i64,
        branch_id: BranchId,
        group_id: PaymentGroupId,
        salesperson_id: SalesPersonId,
        client_id: Option<ClientId>,
        open_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SaleId::new(),
            identifier,
            branch_id,
            status: SaleStatus::Opened,
            items: Vec::new(),
            group_id,
            salesperson_id,
            client_id,
            till_id: None,
            surcharge: Money::zero(),
            discount: Money::zero(),
            open_date,
            confirm_date: None,
            paid_date: None,
            cancel_date: None,
            return_date: None,
            returned_sales: Vec::new(),
            renegotiation_group: None,
        }
    }
}

impl Aggregate for Sale {
    type Id = SaleId;
    type Event = SaleEvent;

    fn aggregate_type() -> &'static str {
        "Sale"
    }

    fn id(&self) -> SaleId {
        self.id
    }

    fn apply(&mut self, event: SaleEvent) {
        match event {
            SaleEvent::ItemAdded(item) => self.items.push(item),
            SaleEvent::ItemRemoved { item_id } => self.items.retain(|i| i.id != item_id),
            SaleEvent::ClientSet { client_id } => self.client_id = Some(client_id),
            SaleEvent::TillSet { till_id } => self.till_id = Some(till_id),
            SaleEvent::SurchargeSet { value } => self.surcharge = value,
            SaleEvent::DiscountSet { value } => self.discount = value,
            SaleEvent::ItemStockChanged {
                item_id,
                quantity_decreased,
            } => {
                if let Some(item) = self.item_mut(item_id) {
                    item.quantity_decreased = quantity_decreased;
                }
            }
            SaleEvent::ItemSplit {
                item_id,
                batch_id,
                quantity,
                new_items,
            } => {
                if let Some(item) = self.item_mut(item_id) {
                    item.batch_id = Some(batch_id);
                    item.quantity = quantity;
                }
                self.items.extend(new_items);
            }
            SaleEvent::StatusChanged(data) => self.apply_status_changed(data),
            SaleEvent::Returned(returned) => {
                for returned_item in &returned.items {
                    if let Some(item) = self.item_mut(returned_item.sale_item_id) {
                        item.returned_quantity += returned_item.quantity;
                    }
                }
                self.returned_sales.push(*returned);
            }
            SaleEvent::Renegotiated { group_id } => self.renegotiation_group = Some(group_id),
        }
    }
}

impl Stored for Sale {
    fn rows(tables: &Tables) -> &HashMap<SaleId, Self> {
        &tables.sales
    }

    fn rows_mut(tables: &mut Tables) -> &mut HashMap<SaleId, Self> {
        &mut tables.sales
    }

    fn history_subject(&self) -> Option<HistorySubject> {
        Some(HistorySubject::Sale(self.id))
    }

    fn notification(&self, event: &SaleEvent) -> Option<CoreEvent> {
        match event {
            SaleEvent::StatusChanged(data) => Some(CoreEvent::SaleStatusChanged {
                sale_id: self.id,
                old: data.old,
                new: data.new,
            }),
            _ => None,
        }
    }
}

// Query methods
impl Sale {
    pub fn identifier(&self) -> i64 {
        self.identifier
    }

    pub fn branch_id(&self) -> BranchId {
        self.branch_id
    }

    pub fn status(&self) -> SaleStatus {
        self.status
    }

    pub fn items(&self) -> &[SaleItem] {
        &self.items
    }

    pub fn item(&self, id: SaleItemId) -> Result<&SaleItem> {
        self.items
            .iter()
            .find(|i| i.id == id)
            .ok_or_else(|| DomainError::not_found("SaleItem", id))
    }

    pub fn group_id(&self) -> PaymentGroupId {
        self.group_id
    }

    pub fn salesperson_id(&self) -> SalesPersonId {
        self.salesperson_id
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn till_id(&self) -> Option<TillId> {
        self.till_id
    }

    pub fn surcharge(&self) -> Money {
        self.surcharge
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn open_date(&self) -> DateTime<Utc> {
        self.open_date
    }

    pub fn confirm_date(&self) -> Option<DateTime<Utc>> {
        self.confirm_date
    }

    pub fn paid_date(&self) -> Option<DateTime<Utc>> {
        self.paid_date
    }

    pub fn cancel_date(&self) -> Option<DateTime<Utc>> {
        self.cancel_date
    }

    pub fn return_date(&self) -> Option<DateTime<Utc>> {
        self.return_date
    }

    pub fn returned_sales(&self) -> &[ReturnedSale] {
        &self.returned_sales
    }

    pub fn renegotiation_group(&self) -> Option<PaymentGroupId> {
        self.renegotiation_group
    }

    pub fn subtotal(&self) -> Money {
        self.items.iter().map(SaleItem::total).sum()
    }

    /// Subtotal plus surcharge minus discount.
    pub fn total(&self) -> Money {
        self.subtotal() + self.surcharge - self.discount
    }

    pub fn returned_total(&self) -> Money {
        self.returned_sales.iter().map(ReturnedSale::returned_total).sum()
    }

    pub fn refunded_total(&self) -> Money {
        self.returned_sales.iter().map(|r| r.refund_value).sum()
    }

    /// Every line has been returned in full.
    pub fn is_fully_returned(&self) -> bool {
        !self.items.is_empty()
            && self
                .items
                .iter()
                .all(|i| i.returned_quantity >= i.quantity)
    }

    fn item_mut(&mut self, id: SaleItemId) -> Option<&mut SaleItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    fn apply_status_changed(&mut self, data: SaleStatusChangedData) {
        self.status = data.new;
        match data.new {
            SaleStatus::Confirmed => self.confirm_date = Some(data.date),
            SaleStatus::Paid => self.paid_date = Some(data.date),
            SaleStatus::Cancelled => self.cancel_date = Some(data.date),
            SaleStatus::Returned => self.return_date = Some(data.date),
            _ => {}
        }
    }

    fn status_changed(&self, new: SaleStatus, now: DateTime<Utc>, reason: Option<String>) -> SaleEvent {
        SaleEvent::StatusChanged(SaleStatusChangedData {
            old: self.status,
            new,
            date: now,
            reason,
        })
    }

    fn ensure_editable(&self, action: &'static str) -> Result<()> {
        if !self.status.can_modify_items() {
            return Err(DomainError::invalid_status("Sale", self.status, action));
        }
        Ok(())
    }
}

// Command methods
impl Sale {
    pub fn add_item(&self, item: SaleItem) -> Result<Vec<SaleEvent>> {
        self.ensure_editable("add items to")?;
        if item.quantity <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(item.quantity));
        }
        if item.price.is_negative() {
            return Err(DomainError::InvalidValue(format!(
                "item price cannot be negative, got {}",
                item.price
            )));
        }
        Ok(vec![SaleEvent::ItemAdded(item)])
    }

    pub fn remove_item(&self, item_id: SaleItemId) -> Result<Vec<SaleEvent>> {
        self.ensure_editable("remove items from")?;
        self.item(item_id)?;
        Ok(vec![SaleEvent::ItemRemoved { item_id }])
    }

    pub fn set_client(&self, client_id: ClientId) -> Result<Vec<SaleEvent>> {
        self.ensure_editable("set the client of")?;
        Ok(vec![SaleEvent::ClientSet { client_id }])
    }

    pub fn set_till(&self, till_id: TillId) -> Result<Vec<SaleEvent>> {
        if !matches!(self.status, SaleStatus::Opened | SaleStatus::Confirmed) {
            return Err(DomainError::invalid_status("Sale", self.status, "set the till of"));
        }
        Ok(vec![SaleEvent::TillSet { till_id }])
    }

    pub fn set_surcharge(&self, value: Money) -> Result<Vec<SaleEvent>> {
        self.ensure_editable("set the surcharge of")?;
        if value.is_negative() {
            return Err(DomainError::InvalidValue("surcharge cannot be negative".to_string()));
        }
        Ok(vec![SaleEvent::SurchargeSet { value }])
    }

    pub fn set_discount(&self, value: Money) -> Result<Vec<SaleEvent>> {
        self.ensure_editable("set the discount of")?;
        if value.is_negative() || value > self.subtotal() + self.surcharge {
            return Err(DomainError::InvalidValue(format!(
                "discount {value} out of range"
            )));
        }
        Ok(vec![SaleEvent::DiscountSet { value }])
    }

    /// Records how much stock a line holds.
    pub fn set_item_decreased(
        &self,
        item_id: SaleItemId,
        quantity_decreased: Decimal,
    ) -> Result<Vec<SaleEvent>> {
        let item = self.item(item_id)?;
        if quantity_decreased < Decimal::ZERO || quantity_decreased > item.quantity {
            return Err(DomainError::InvalidQuantity(quantity_decreased));
        }
        if item.quantity_decreased == quantity_decreased {
            return Ok(Vec::new());
        }
        Ok(vec![SaleEvent::ItemStockChanged {
            item_id,
            quantity_decreased,
        }])
    }

    /// Splits a line across batches. The first split stays on the line.
    pub fn split_item(
        &self,
        item_id: SaleItemId,
        splits: &[(BatchId, Decimal)],
    ) -> Result<Vec<SaleEvent>> {
        self.ensure_editable("split items of")?;
        let item = self.item(item_id)?;
        let Some(((primary_batch, primary_quantity), rest)) = splits.split_first() else {
            return Err(DomainError::InvalidValue("no batches to split into".to_string()));
        };
        if splits.iter().any(|(_, q)| *q <= Decimal::ZERO) {
            return Err(DomainError::InvalidValue(
                "batch quantities must be positive".to_string(),
            ));
        }
        let total: Decimal = splits.iter().map(|(_, q)| *q).sum();
        if total != item.quantity {
            return Err(DomainError::InvalidQuantity(total));
        }
        if !item.quantity_decreased.is_zero() {
            return Err(DomainError::InvalidValue(
                "cannot split an item holding stock".to_string(),
            ));
        }

        let new_items = rest
            .iter()
            .map(|(batch_id, quantity)| SaleItem {
                batch_id: Some(*batch_id),
                ..SaleItem::new(item.sellable_id, *quantity, item.price)
            })
            .collect();
        Ok(vec![SaleEvent::ItemSplit {
            item_id,
            batch_id: *primary_batch,
            quantity: *primary_quantity,
            new_items,
        }])
    }

    pub fn confirm(&self, now: DateTime<Utc>) -> Result<Vec<SaleEvent>> {
        if !self.status.can_confirm() {
            return Err(DomainError::invalid_status("Sale", self.status, "confirm"));
        }
        if self.items.is_empty() {
            return Err(DomainError::InvalidValue("sale has no items".to_string()));
        }
        Ok(vec![self.status_changed(SaleStatus::Confirmed, now, None)])
    }

    pub fn mark_paid(&self, now: DateTime<Utc>) -> Result<Vec<SaleEvent>> {
        if !self.status.can_pay() {
            return Err(DomainError::invalid_status("Sale", self.status, "pay"));
        }
        Ok(vec![self.status_changed(SaleStatus::Paid, now, None)])
    }

    /// Checks the returned quantities; status moves separately.
    pub fn return_items(&self, returned: ReturnedSale) -> Result<Vec<SaleEvent>> {
        if !self.status.can_return() {
            return Err(DomainError::invalid_status("Sale", self.status, "return"));
        }
        if returned.items.is_empty() {
            return Err(DomainError::InvalidValue("nothing to return".to_string()));
        }
        let mut requested: HashMap<SaleItemId, Decimal> = HashMap::new();
        for returned_item in &returned.items {
            if returned_item.quantity <= Decimal::ZERO {
                return Err(DomainError::InvalidQuantity(returned_item.quantity));
            }
            *requested.entry(returned_item.sale_item_id).or_default() += returned_item.quantity;
        }
        for (item_id, quantity) in requested {
            let returnable = self.item(item_id)?.returnable_quantity();
            if quantity > returnable {
                return Err(DomainError::OverSaleReturn {
                    requested: quantity,
                    returnable,
                });
            }
        }
        Ok(vec![SaleEvent::Returned(Box::new(returned))])
    }

    pub fn mark_returned(&self, reason: &str, now: DateTime<Utc>) -> Result<Vec<SaleEvent>> {
        if !self.status.can_return() {
            return Err(DomainError::invalid_status("Sale", self.status, "return"));
        }
        Ok(vec![self.status_changed(
            SaleStatus::Returned,
            now,
            Some(reason.to_string()),
        )])
    }

    pub fn cancel(&self, reason: &str, now: DateTime<Utc>) -> Result<Vec<SaleEvent>> {
        if !self.status.can_cancel() {
            return Err(DomainError::invalid_status("Sale", self.status, "cancel"));
        }
        Ok(vec![self.status_changed(
            SaleStatus::Cancelled,
            now,
            Some(reason.to_string()),
        )])
    }

    pub fn renegotiate(
        &self,
        group_id: PaymentGroupId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SaleEvent>> {
        if !self.status.can_renegotiate() {
            return Err(DomainError::invalid_status("Sale", self.status, "renegotiate"));
        }
        Ok(vec![
            SaleEvent::Renegotiated { group_id },
            self.status_changed(SaleStatus::Renegotiated, now, Some(reason.to_string())),
        ])
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 15, 0, 0).unwrap()
    }

    fn sale() -> Sale {
        Sale::new(
            1,
            BranchId::new(),
            PaymentGroupId::new(),
            SalesPersonId::new(),
            None,
            now(),
        )
    }

    fn with_item(sale: &mut Sale, quantity: Decimal, cents: i64) -> SaleItemId {
        let item = SaleItem::new(SellableId::new(), quantity, Money::from_cents(cents));
        let id = item.id;
        let events = sale.add_item(item).unwrap();
        sale.apply_events(events);
        id
    }

    fn returned(sale: &Sale, item_id: SaleItemId, quantity: Decimal) -> ReturnedSale {
        let item = sale.item(item_id).unwrap();
        ReturnedSale {
            id: ReturnedSaleId::new(),
            identifier: 1,
            sale_id: sale.id,
            items: vec![ReturnedSaleItem {
                sale_item_id: item_id,
                sellable_id: item.sellable_id,
                batch_id: None,
                quantity,
                price: item.price,
            }],
            reason: "defect".to_string(),
            refund_value: Money::zero(),
            refund_group: None,
            date: now(),
            responsible: UserId::new(),
        }
    }

    #[test]
    fn test_total_with_surcharge_and_discount() {
        let mut sale = sale();
        with_item(&mut sale, dec!(3), 1000);
        with_item(&mut sale, dec!(0.5), 333);
        sale.apply_events(sale.set_surcharge(Money::from_cents(200)).unwrap());
        sale.apply_events(sale.set_discount(Money::from_cents(100)).unwrap());

        assert_eq!(sale.subtotal(), Money::from_cents(3167));
        assert_eq!(sale.total(), Money::from_cents(3267));
    }

    #[test]
    fn test_confirm_needs_items() {
        let sale = sale();
        assert!(sale.confirm(now()).is_err());
    }

    #[test]
    fn test_confirmed_sale_is_frozen() {
        let mut sale = sale();
        with_item(&mut sale, dec!(1), 1000);
        sale.apply_events(sale.confirm(now()).unwrap());
        assert_eq!(sale.status(), SaleStatus::Confirmed);
        assert_eq!(sale.confirm_date(), Some(now()));

        let extra = SaleItem::new(SellableId::new(), dec!(1), Money::from_cents(100));
        assert!(matches!(
            sale.add_item(extra),
            Err(DomainError::InvalidStatus { .. })
        ));
    }

    #[test]
    fn test_returns_never_exceed_the_line() {
        let mut sale = sale();
        let item = with_item(&mut sale, dec!(3), 1000);
        sale.apply_events(sale.confirm(now()).unwrap());

        let first = returned(&sale, item, dec!(2));
        sale.apply_events(sale.return_items(first).unwrap());
        assert_eq!(sale.item(item).unwrap().returnable_quantity(), dec!(1));

        let second = returned(&sale, item, dec!(2));
        assert!(matches!(
            sale.return_items(second),
            Err(DomainError::OverSaleReturn { .. })
        ));
        assert!(!sale.is_fully_returned());

        let last = returned(&sale, item, dec!(1));
        sale.apply_events(sale.return_items(last).unwrap());
        assert!(sale.is_fully_returned());
        assert_eq!(sale.returned_total(), Money::from_cents(3000));
    }

    #[test]
    fn test_split_keeps_primary_batch_on_the_line() {
        let mut sale = sale();
        let item = with_item(&mut sale, dec!(5), 1000);
        let (b1, b2) = (BatchId::new(), BatchId::new());

        assert!(sale.split_item(item, &[(b1, dec!(2)), (b2, dec!(2))]).is_err());
        sale.apply_events(sale.split_item(item, &[(b1, dec!(2)), (b2, dec!(3))]).unwrap());

        assert_eq!(sale.items().len(), 2);
        let primary = sale.item(item).unwrap();
        assert_eq!((primary.batch_id, primary.quantity), (Some(b1), dec!(2)));
        assert_eq!(sale.items()[1].batch_id, Some(b2));
        assert_eq!(sale.subtotal(), Money::from_cents(5000));
    }

    #[test]
    fn test_decreased_stays_within_quantity() {
        let mut sale = sale();
        let item = with_item(&mut sale, dec!(2), 1000);
        assert!(sale.set_item_decreased(item, dec!(3)).is_err());
        assert!(sale.set_item_decreased(item, dec!(-1)).is_err());
        sale.apply_events(sale.set_item_decreased(item, dec!(2)).unwrap());
        assert!(sale.set_item_decreased(item, dec!(2)).unwrap().is_empty());
    }
}
