//! Sale service: the quote-to-payment lifecycle and its stock and money effects.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use common::{
    BatchId, ClientId, Money, PaymentGroupId, PaymentId, PaymentMethodId,
    ReturnedSaleId, SaleId, SaleItemId, SalesPersonId, SellableId, TillId,
};
use rust_decimal::Decimal;

use crate::catalog::CatalogService;
use crate::config::CoreConfig;
use crate::error::{DomainError, Result};
use crate::history::{HistoryEntry, HistorySubject};
use crate::payment::{GroupKind, PaymentDirection, PaymentService};
use crate::stock::{StockGateway, StockMovement, StockReason};
use crate::store::{IdentifierKind, Transaction};
use crate::till::{TillService, TillStatus};
use crate::workorder::{WorkOrder, WorkOrderItem, WorkOrderService, WorkOrderStatus, sync};

use super::{Commission, ReturnedSale, ReturnedSaleItem, Sale, SaleEvent, SaleItem};

/// Service for managing sales.
#[derive(Debug, Clone, Default)]
pub struct SaleService {
    config: CoreConfig,
    catalog: CatalogService,
    stock: StockGateway,
    payments: PaymentService,
    tills: TillService,
    work_orders: WorkOrderService,
}

impl SaleService {
    pub fn new(
        config: CoreConfig,
        payments: PaymentService,
        tills: TillService,
        work_orders: WorkOrderService,
    ) -> Self {
        Self {
            config,
            catalog: CatalogService::new(),
            stock: StockGateway::new(),
            payments,
            tills,
            work_orders,
        }
    }

    pub fn sale(&self, tx: &Transaction, id: SaleId) -> Result<Sale> {
        tx.load(id)
    }

    /// Opens a quote with an empty payment group.
    ///
    /// The open till of the session's station, if any, is assigned to the sale.
    #[tracing::instrument(skip(self, tx))]
    pub fn create_sale(
        &self,
        tx: &mut Transaction,
        salesperson_id: SalesPersonId,
        client_id: Option<ClientId>,
    ) -> Result<SaleId> {
        tx.run(|tx| {
            self.catalog.sales_person(tx, salesperson_id)?;
            if let Some(client_id) = client_id {
                self.catalog.client(tx, client_id)?;
            }

            let identifier = tx.next_identifier(IdentifierKind::Sale);
            let group_id = self
                .payments
                .create_group(tx, GroupKind::Sale, &format!("Sale {identifier}"))?;
            if let Some(client_id) = client_id {
                self.payments.set_payer(tx, group_id, client_id)?;
            }

            let sale = Sale::new(
                identifier,
                tx.branch(),
                group_id,
                salesperson_id,
                client_id,
                tx.now(),
            );
            let id = sale.id;
            tx.save(sale);

            if let Ok(station) = tx.station()
                && let Some(till) = self.tills.current(tx, station)?
            {
                tx.execute::<Sale, _>(id, |sale| sale.set_till(till.id))?;
            }

            metrics::counter!("sales_created_total").increment(1);
            tracing::info!(sale = %id, identifier, "sale opened");
            Ok(id)
        })
    }

    /// Adds a line; the price defaults to the sellable's.
    #[tracing::instrument(skip(self, tx))]
    pub fn add_sellable(
        &self,
        tx: &mut Transaction,
        sale_id: SaleId,
        sellable_id: SellableId,
        quantity: Decimal,
        price: Option<Money>,
        batch_id: Option<BatchId>,
    ) -> Result<SaleItemId> {
        tx.run(|tx| {
            let sellable = self.catalog.sellable(tx, sellable_id)?;
            if let Some(batch_id) = batch_id {
                self.ensure_batch_of(tx, batch_id, sellable_id)?;
            }
            let item = SaleItem {
                batch_id,
                ..SaleItem::new(sellable_id, quantity, price.unwrap_or(sellable.price))
            };
            let id = item.id;
            tx.execute::<Sale, _>(sale_id, |sale| sale.add_item(item))?;
            Ok(id)
        })
    }

    /// Removes a line not linked to a work order item.
    pub fn remove_item(&self, tx: &mut Transaction, sale_id: SaleId, item_id: SaleItemId) -> Result<()> {
        tx.run(|tx| {
            if sync::linked_item(tx, sale_id, item_id).is_some() {
                return Err(DomainError::InvalidValue(
                    "sale item is linked to a work order item".to_string(),
                ));
            }
            tx.execute::<Sale, _>(sale_id, |sale| sale.remove_item(item_id))?;
            Ok(())
        })
    }

    /// Sets the client, who also becomes the payer of the sale's payments.
    pub fn set_client(&self, tx: &mut Transaction, sale_id: SaleId, client_id: ClientId) -> Result<()> {
        tx.run(|tx| {
            self.catalog.client(tx, client_id)?;
            let result = tx.execute::<Sale, _>(sale_id, |sale| sale.set_client(client_id))?;
            self.payments
                .set_payer(tx, result.aggregate.group_id, client_id)
        })
    }

    pub fn set_surcharge(&self, tx: &mut Transaction, sale_id: SaleId, value: Money) -> Result<()> {
        tx.run(|tx| {
            tx.execute::<Sale, _>(sale_id, |sale| sale.set_surcharge(value))?;
            Ok(())
        })
    }

    pub fn set_discount(&self, tx: &mut Transaction, sale_id: SaleId, value: Money) -> Result<()> {
        tx.run(|tx| {
            tx.execute::<Sale, _>(sale_id, |sale| sale.set_discount(value))?;
            Ok(())
        })
    }

    pub fn set_till(&self, tx: &mut Transaction, sale_id: SaleId, till_id: TillId) -> Result<()> {
        tx.run(|tx| {
            if self.tills.till(tx, till_id)?.status() != TillStatus::Open {
                return Err(DomainError::TillNotOpen);
            }
            tx.execute::<Sale, _>(sale_id, |sale| sale.set_till(till_id))?;
            Ok(())
        })
    }

    /// Adds IN installments to the sale's payment group.
    #[tracing::instrument(skip(self, tx, due_dates))]
    pub fn add_payments(
        &self,
        tx: &mut Transaction,
        sale_id: SaleId,
        method_id: PaymentMethodId,
        value: Money,
        due_dates: &[NaiveDate],
        interest: Decimal,
    ) -> Result<Vec<PaymentId>> {
        tx.run(|tx| {
            let sale = self.sale(tx, sale_id)?;
            if !sale.status.can_confirm() {
                return Err(DomainError::invalid_status("Sale", sale.status, "add payments to"));
            }
            self.payments
                .validate_installment_count(tx, method_id, due_dates.len())?;
            self.payments.create_payments(
                tx,
                sale.group_id,
                method_id,
                PaymentDirection::In,
                value,
                due_dates,
                interest,
            )
        })
    }

    /// Confirms a quote: takes stock for every line and sets the payments pending.
    #[tracing::instrument(skip(self, tx))]
    pub fn confirm(&self, tx: &mut Transaction, sale_id: SaleId) -> Result<()> {
        tx.run(|tx| {
            let now = tx.now();
            let sale = self.sale(tx, sale_id)?;
            sale.confirm(now)?;

            if let Some(client_id) = sale.client_id
                && !self.catalog.client(tx, client_id)?.is_active
            {
                return Err(DomainError::InactiveClient);
            }
            for item in &sale.items {
                if item.batch_id.is_none() && self.catalog.sellable(tx, item.sellable_id)?.requires_batch()? {
                    return Err(DomainError::MissingBatch);
                }
            }
            let payments = self.payments.group(tx, sale.group_id)?.total();
            if payments != sale.total() {
                return Err(DomainError::PaymentTotalMismatch {
                    payments,
                    total: sale.total(),
                });
            }

            for item in &sale.items {
                self.take_stock(tx, &sale, item)?;
            }
            self.payments.confirm_group(tx, sale.group_id)?;
            tx.execute::<Sale, _>(sale_id, |sale| sale.confirm(now))?;

            metrics::counter!("sales_confirmed_total").increment(1);
            tracing::info!(sale = %sale_id, total = %sale.total(), "sale confirmed");
            Ok(())
        })
    }

    /// Pays every pending payment, registers them in the sale's till and
    /// accrues commissions.
    #[tracing::instrument(skip(self, tx))]
    pub fn pay(&self, tx: &mut Transaction, sale_id: SaleId) -> Result<Vec<PaymentId>> {
        tx.run(|tx| {
            let now = tx.now();
            let sale = self.sale(tx, sale_id)?;
            sale.mark_paid(now)?;
            if let Some(till_id) = sale.till_id
                && self.tills.till(tx, till_id)?.status() != TillStatus::Open
            {
                return Err(DomainError::TillNotOpen);
            }

            let paid = self.payments.pay_group(tx, sale.group_id)?;
            if let Some(till_id) = sale.till_id {
                for payment_id in &paid {
                    self.tills.add_entry(tx, till_id, *payment_id)?;
                }
            }
            self.accrue_commissions(tx, &sale, &paid)?;
            tx.execute::<Sale, _>(sale_id, |sale| sale.mark_paid(now))?;

            metrics::counter!("sales_paid_total").increment(1);
            tracing::info!(sale = %sale_id, payments = paid.len(), "sale paid");
            Ok(paid)
        })
    }

    /// Returns some quantities of a confirmed or paid sale.
    ///
    /// Stock goes back for the returned lines. Whatever was paid above the
    /// value the client keeps is refunded through an OUT money payment, paid
    /// through an open till when configured, pending otherwise. A sale
    /// returned in full moves to Returned and its unpaid payments are cancelled.
    #[tracing::instrument(skip(self, tx, items))]
    pub fn return_sale(
        &self,
        tx: &mut Transaction,
        sale_id: SaleId,
        items: &[(SaleItemId, Decimal)],
        reason: &str,
    ) -> Result<ReturnedSaleId> {
        tx.run(|tx| {
            if reason.trim().is_empty() {
                return Err(DomainError::NeedReason {
                    action: "return a sale",
                });
            }
            let sale = self.sale(tx, sale_id)?;

            let mut quantities: BTreeMap<SaleItemId, Decimal> = BTreeMap::new();
            for (item_id, quantity) in items {
                *quantities.entry(*item_id).or_default() += *quantity;
            }
            let mut returned_items = Vec::with_capacity(quantities.len());
            for (item_id, quantity) in &quantities {
                let item = sale.item(*item_id)?;
                returned_items.push(ReturnedSaleItem {
                    sale_item_id: item.id,
                    sellable_id: item.sellable_id,
                    batch_id: item.batch_id,
                    quantity: *quantity,
                    price: item.price,
                });
            }

            let mut returned = ReturnedSale {
                id: ReturnedSaleId::new(),
                identifier: tx.next_identifier(IdentifierKind::ReturnedSale),
                sale_id,
                items: returned_items,
                reason: reason.to_string(),
                refund_value: Money::zero(),
                refund_group: None,
                date: tx.now(),
                responsible: tx.actor(),
            };
            sale.return_items(returned.clone())?;

            for returned_item in &returned.items {
                let item = sale.item(returned_item.sale_item_id)?;
                let linked = sync::linked_item(tx, sale_id, item.id);
                let held = sync::held_quantity(item, linked.as_ref());
                let back = returned_item.quantity.min(held);
                if back > Decimal::ZERO {
                    self.stock.increase_stock(
                        tx,
                        StockMovement::new(item.sellable_id, sale.branch_id, back, StockReason::ReturnedSale)
                            .batch(item.batch_id)
                            .reference(sale_id),
                    )?;
                }
                sync::set_held(tx, sale_id, item, linked.as_ref(), held - back)?;
            }

            let retained = sale.total() - sale.returned_total() - returned.returned_total();
            let paid = self.payments.group(tx, sale.group_id)?.total_paid();
            let refund = paid - retained.max(Money::zero()) - sale.refunded_total();
            if refund.is_positive() {
                returned.refund_value = refund;
                returned.refund_group = Some(self.refund(tx, &sale, returned.identifier, refund)?);
            }

            let returned_id = returned.id;
            let refund_value = returned.refund_value;
            let result = tx.execute::<Sale, _>(sale_id, |sale| sale.return_items(returned))?;
            if result.aggregate.is_fully_returned() {
                self.payments
                    .cancel_group(tx, sale.group_id, Some(reason))?;
                let now = tx.now();
                tx.execute::<Sale, _>(sale_id, |sale| sale.mark_returned(reason, now))?;
            }

            metrics::counter!("sales_returned_total").increment(1);
            tracing::info!(sale = %sale_id, refund = %refund_value, "sale returned");
            Ok(returned_id)
        })
    }

    /// Cancels a sale, returning the stock it took and cancelling its
    /// unpaid payments. A live coupled work order blocks the cancellation
    /// unless `ignore_work_order` is set; the work order is then cancelled
    /// along with the sale.
    #[tracing::instrument(skip(self, tx))]
    pub fn cancel(
        &self,
        tx: &mut Transaction,
        sale_id: SaleId,
        reason: &str,
        ignore_work_order: bool,
    ) -> Result<()> {
        tx.run(|tx| {
            let now = tx.now();
            let sale = self.sale(tx, sale_id)?;
            sale.cancel(reason, now)?;
            let has_live_order = self
                .work_orders
                .of_sale(tx, sale_id)
                .iter()
                .any(|wo| wo.status() != WorkOrderStatus::Cancelled);
            if has_live_order && !ignore_work_order {
                return Err(DomainError::HasCoupledWorkOrder);
            }

            for item in &sale.items {
                self.give_back_stock(tx, &sale, item, StockReason::CancelledSale)?;
            }
            self.payments.cancel_group(tx, sale.group_id, Some(reason))?;
            tx.execute::<Sale, _>(sale_id, |sale| sale.cancel(reason, now))?;

            metrics::counter!("sales_cancelled_total").increment(1);
            tracing::info!(sale = %sale_id, "sale cancelled");
            Ok(())
        })
    }

    /// Replaces the unpaid payments of a confirmed sale with a new
    /// renegotiation group. Returns the group for the new plan.
    #[tracing::instrument(skip(self, tx))]
    pub fn renegotiate(
        &self,
        tx: &mut Transaction,
        sale_id: SaleId,
        reason: &str,
    ) -> Result<PaymentGroupId> {
        tx.run(|tx| {
            let now = tx.now();
            let sale = self.sale(tx, sale_id)?;
            sale.renegotiate(sale.group_id, reason, now)?;

            let group_id = self.payments.create_group(
                tx,
                GroupKind::Renegotiation,
                &format!("Renegotiation of sale {}", sale.identifier),
            )?;
            if let Some(client_id) = sale.client_id {
                self.payments.set_payer(tx, group_id, client_id)?;
            }
            self.payments.cancel_group(tx, sale.group_id, Some(reason))?;
            tx.execute::<Sale, _>(sale_id, |sale| sale.renegotiate(group_id, reason, now))?;

            tracing::info!(sale = %sale_id, group = %group_id, "sale renegotiated");
            Ok(group_id)
        })
    }

    /// Splits a line across batches. A linked work order item takes the
    /// first batch and gets a sibling linked to every new line.
    #[tracing::instrument(skip(self, tx, splits))]
    pub fn split_item_batches(
        &self,
        tx: &mut Transaction,
        sale_id: SaleId,
        item_id: SaleItemId,
        splits: &[(BatchId, Decimal)],
    ) -> Result<Vec<SaleItemId>> {
        tx.run(|tx| {
            let sale = self.sale(tx, sale_id)?;
            let sellable_id = sale.item(item_id)?.sellable_id;
            for (batch_id, _) in splits {
                self.ensure_batch_of(tx, *batch_id, sellable_id)?;
            }
            let linked = sync::linked_item(tx, sale_id, item_id);

            let result = tx.execute::<Sale, _>(sale_id, |sale| sale.split_item(item_id, splits))?;
            let (batch_id, quantity, new_items) = result
                .events
                .into_iter()
                .find_map(|event| match event {
                    SaleEvent::ItemSplit {
                        batch_id,
                        quantity,
                        new_items,
                        ..
                    } => Some((batch_id, quantity, new_items)),
                    _ => None,
                })
                .ok_or_else(|| {
                    DomainError::DatabaseInconsistency("batch split produced no split event".to_string())
                })?;

            if let Some(linked) = linked {
                let work_order_id = linked.work_order_id;
                tx.execute::<WorkOrder, _>(work_order_id, |wo| {
                    wo.set_item_batch(linked.item.id, batch_id, quantity)
                })?;
                for new_item in &new_items {
                    let sibling = WorkOrderItem {
                        batch_id: new_item.batch_id,
                        sale_item_id: Some(new_item.id),
                        ..WorkOrderItem::new(
                            new_item.sellable_id,
                            new_item.quantity,
                            new_item.price,
                            linked.item.manages_stock,
                        )
                    };
                    tx.execute::<WorkOrder, _>(work_order_id, |wo| {
                        wo.add_item(sibling)
                    })?;
                }
            }

            Ok(new_items.iter().map(|i| i.id).collect())
        })
    }

    /// Commissions accrued on a sale's received payments.
    pub fn commissions(&self, tx: &Transaction, sale_id: SaleId) -> Vec<Commission> {
        tx.tables()
            .commissions
            .iter()
            .filter(|c| c.sale_id == sale_id)
            .cloned()
            .collect()
    }

    pub fn history(&self, tx: &Transaction, sale_id: SaleId) -> Vec<HistoryEntry> {
        tx.history(HistorySubject::Sale(sale_id))
    }

    /// Decreases whatever the line and its work order item do not hold yet.
    fn take_stock(&self, tx: &mut Transaction, sale: &Sale, item: &SaleItem) -> Result<()> {
        let linked = sync::linked_item(tx, sale.id, item.id);
        let missing = item.quantity - sync::held_quantity(item, linked.as_ref());
        if missing > Decimal::ZERO {
            self.stock.decrease_stock(
                tx,
                StockMovement::new(item.sellable_id, sale.branch_id, missing, StockReason::Sale)
                    .batch(item.batch_id)
                    .reference(sale.id),
            )?;
        }
        sync::set_held(tx, sale.id, item, linked.as_ref(), item.quantity)
    }

    /// Increases whatever the line or its work order item holds.
    fn give_back_stock(
        &self,
        tx: &mut Transaction,
        sale: &Sale,
        item: &SaleItem,
        reason: StockReason,
    ) -> Result<()> {
        let linked = sync::linked_item(tx, sale.id, item.id);
        let held = sync::held_quantity(item, linked.as_ref());
        if held > Decimal::ZERO {
            self.stock.increase_stock(
                tx,
                StockMovement::new(item.sellable_id, sale.branch_id, held, reason)
                    .batch(item.batch_id)
                    .reference(sale.id),
            )?;
        }
        sync::set_held(tx, sale.id, item, linked.as_ref(), Decimal::ZERO)
    }

    fn accrue_commissions(&self, tx: &mut Transaction, sale: &Sale, paid: &[PaymentId]) -> Result<()> {
        let percentage = self
            .catalog
            .sales_person(tx, sale.salesperson_id)?
            .commission_percentage;
        if percentage.is_zero() {
            return Ok(());
        }
        for payment_id in paid {
            let payment = self.payments.payment(tx, *payment_id)?;
            if payment.direction != PaymentDirection::In {
                continue;
            }
            let base = payment.paid_value.unwrap_or(payment.value);
            let commission = Commission {
                sale_id: sale.id,
                payment_id: *payment_id,
                salesperson_id: sale.salesperson_id,
                value: base.multiply(percentage / Decimal::ONE_HUNDRED).round(),
                date: tx.now(),
            };
            tx.record("commission", "Sale", sale.id.into(), &commission)?;
            tx.tables_mut().commissions.push(commission);
        }
        Ok(())
    }

    /// Creates the OUT money payment paying a refund back to the client.
    fn refund(
        &self,
        tx: &mut Transaction,
        sale: &Sale,
        identifier: i64,
        value: Money,
    ) -> Result<PaymentGroupId> {
        let description = format!("Refund of sale {} (return {identifier})", sale.identifier);
        let group_id = self
            .payments
            .create_group(tx, GroupKind::SaleReturn, &description)?;
        if let Some(client_id) = sale.client_id {
            self.payments.set_recipient(tx, group_id, client_id)?;
        }
        let method = self.payments.money_method(tx)?;
        let today = tx.today();
        let payment_id = self.payments.create_payment(
            tx,
            group_id,
            method.id,
            PaymentDirection::Out,
            value,
            today,
            &description,
        )?;
        self.payments.confirm_group(tx, group_id)?;

        if self.config.pay_refunds_through_till
            && let Some(till_id) = self.usable_till(tx, sale)?
        {
            self.tills.pay_through_till(tx, till_id, payment_id)?;
        }
        Ok(group_id)
    }

    /// The sale's till when open, else the open till of the session's station.
    fn usable_till(&self, tx: &Transaction, sale: &Sale) -> Result<Option<TillId>> {
        if let Some(till_id) = sale.till_id
            && self.tills.till(tx, till_id)?.status() == TillStatus::Open
        {
            return Ok(Some(till_id));
        }
        match tx.station() {
            Ok(station) => Ok(self.tills.current(tx, station)?.map(|t| t.id)),
            Err(_) => Ok(None),
        }
    }

    fn ensure_batch_of(&self, tx: &Transaction, batch_id: BatchId, sellable_id: SellableId) -> Result<()> {
        let batch = self.catalog.batch(tx, batch_id)?;
        if batch.sellable_id != sellable_id {
            return Err(DomainError::InvalidValue(format!(
                "batch {} does not belong to the sellable",
                batch.number
            )));
        }
        Ok(())
    }
}
