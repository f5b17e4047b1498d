//! Payment group aggregate and the payments it owns.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use common::{BranchId, ClientId, Money, PaymentGroupId, PaymentId, PaymentMethodId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::command::Stored;
use crate::error::{DomainError, Result};
use crate::events::CoreEvent;
use crate::history::HistorySubject;
use crate::store::Tables;

use super::events::{DueDateChangedData, PaymentStatusChangedData};
use super::{
    CardData, CheckData, PaymentDirection, PaymentGroupEvent, PaymentMethod, PaymentMethodKind,
    PaymentStatus,
};

/// One installment of money moving in or out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub identifier: i64,
    pub group_id: PaymentGroupId,
    pub branch_id: BranchId,
    pub method_id: PaymentMethodId,
    pub method_kind: PaymentMethodKind,
    pub direction: PaymentDirection,
    pub status: PaymentStatus,
    pub value: Money,
    pub description: String,
    pub due_date: NaiveDate,
    pub open_date: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
    pub paid_value: Option<Money>,
    pub cancel_date: Option<DateTime<Utc>>,
    pub card_data: Option<CardData>,
    pub check_data: Option<CheckData>,
}

impl Payment {
    pub fn is_paid(&self) -> bool {
        self.status.is_settled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == PaymentStatus::Cancelled
    }

    /// Value with its direction: negative for outgoing payments.
    pub fn signed_value(&self) -> Money {
        let value = self.paid_value.unwrap_or(self.value);
        match self.direction {
            PaymentDirection::In => value,
            PaymentDirection::Out => -value,
        }
    }

    /// Days past the due date, zero when not overdue.
    pub fn days_late(&self, today: NaiveDate) -> i64 {
        (today - self.due_date).num_days().max(0)
    }

    /// One-off fee once the payment is overdue.
    pub fn penalty(&self, method: &PaymentMethod, today: NaiveDate) -> Money {
        if self.is_paid() || self.days_late(today) == 0 {
            return Money::zero();
        }
        self.value
            .multiply(method.penalty / Decimal::ONE_HUNDRED)
            .round()
    }

    /// Linear daily interest accrued since the due date.
    pub fn interest(&self, method: &PaymentMethod, today: NaiveDate) -> Money {
        if self.is_paid() {
            return Money::zero();
        }
        let days = Decimal::from(self.days_late(today));
        self.value
            .multiply(method.daily_interest / Decimal::ONE_HUNDRED * days)
            .round()
    }
}

/// What kind of document a group pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKind {
    Sale,
    Purchase,
    Renegotiation,
    SaleReturn,
    /// Standalone payments such as till supplies and removals.
    Lonely,
}

/// The payments of one business document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentGroup {
    pub(crate) id: PaymentGroupId,
    pub(crate) kind: GroupKind,
    pub(crate) branch_id: BranchId,
    pub(crate) payer: Option<ClientId>,
    pub(crate) recipient: Option<ClientId>,
    pub(crate) description: String,
    pub(crate) payments: Vec<Payment>,
}

impl PaymentGroup {
    pub fn new(kind: GroupKind, branch_id: BranchId, description: impl Into<String>) -> Self {
        Self {
            id: PaymentGroupId::new(),
            kind,
            branch_id,
            payer: None,
            recipient: None,
            description: description.into(),
            payments: Vec::new(),
        }
    }
}

impl Aggregate for PaymentGroup {
    type Id = PaymentGroupId;
    type Event = PaymentGroupEvent;

    fn aggregate_type() -> &'static str {
        "PaymentGroup"
    }

    fn id(&self) -> PaymentGroupId {
        self.id
    }

    fn apply(&mut self, event: PaymentGroupEvent) {
        match event {
            PaymentGroupEvent::PaymentAdded(payment) => self.payments.push(*payment),
            PaymentGroupEvent::PaymentStatusChanged(data) => self.apply_status_changed(data),
            PaymentGroupEvent::DueDateChanged(data) => {
                if let Some(payment) = self.payment_mut(data.payment_id) {
                    payment.due_date = data.new;
                }
            }
            PaymentGroupEvent::PayerSet { client_id } => self.payer = Some(client_id),
            PaymentGroupEvent::RecipientSet { client_id } => self.recipient = Some(client_id),
            PaymentGroupEvent::CardDataSet { payment_id, data } => {
                if let Some(payment) = self.payment_mut(payment_id) {
                    payment.card_data = Some(data);
                }
            }
            PaymentGroupEvent::CheckDataSet { payment_id, data } => {
                if let Some(payment) = self.payment_mut(payment_id) {
                    payment.check_data = Some(data);
                }
            }
        }
    }
}

impl Stored for PaymentGroup {
    fn rows(tables: &Tables) -> &HashMap<PaymentGroupId, Self> {
        &tables.payment_groups
    }

    fn rows_mut(tables: &mut Tables) -> &mut HashMap<PaymentGroupId, Self> {
        &mut tables.payment_groups
    }

    fn history_subject(&self) -> Option<HistorySubject> {
        None
    }

    fn notification(&self, event: &PaymentGroupEvent) -> Option<CoreEvent> {
        match event {
            PaymentGroupEvent::PaymentStatusChanged(data) => Some(CoreEvent::PaymentStatusChanged {
                payment_id: data.payment_id,
                old: data.old,
                new: data.new,
            }),
            _ => None,
        }
    }
}

// Query methods
impl PaymentGroup {
    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn branch_id(&self) -> BranchId {
        self.branch_id
    }

    pub fn payer(&self) -> Option<ClientId> {
        self.payer
    }

    pub fn recipient(&self) -> Option<ClientId> {
        self.recipient
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn payment(&self, id: PaymentId) -> Result<&Payment> {
        self.payments
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| DomainError::not_found("Payment", id))
    }

    /// Sum of the values of every non-cancelled payment.
    pub fn total(&self) -> Money {
        self.payments
            .iter()
            .filter(|p| !p.is_cancelled())
            .map(|p| p.value)
            .sum()
    }

    /// Sum of what was actually paid.
    pub fn total_paid(&self) -> Money {
        self.payments
            .iter()
            .filter(|p| p.is_paid())
            .map(|p| p.paid_value.unwrap_or(p.value))
            .sum()
    }

    /// Sum of payments still to be settled.
    pub fn total_to_pay(&self) -> Money {
        self.payments
            .iter()
            .filter(|p| !p.is_cancelled() && !p.is_paid())
            .map(|p| p.value)
            .sum()
    }

    fn payment_mut(&mut self, id: PaymentId) -> Option<&mut Payment> {
        self.payments.iter_mut().find(|p| p.id == id)
    }

    fn apply_status_changed(&mut self, data: PaymentStatusChangedData) {
        let Some(payment) = self.payment_mut(data.payment_id) else {
            return;
        };
        payment.status = data.new;
        if data.new == PaymentStatus::Paid {
            payment.paid_value = data.paid_value;
            payment.paid_date = data.paid_date;
        } else {
            payment.paid_value = None;
            payment.paid_date = None;
        }
        if data.new == PaymentStatus::Cancelled {
            payment.cancel_date = Some(data.date);
        }
    }
}

// Command methods
impl PaymentGroup {
    pub fn add_payment(&self, payment: Payment) -> Result<Vec<PaymentGroupEvent>> {
        if payment.group_id != self.id {
            return Err(DomainError::DatabaseInconsistency(format!(
                "payment {} does not belong to group {}",
                payment.id, self.id
            )));
        }
        if !payment.value.is_positive() {
            return Err(DomainError::InvalidValue(format!(
                "payment value must be positive, got {}",
                payment.value
            )));
        }
        Ok(vec![PaymentGroupEvent::PaymentAdded(Box::new(payment))])
    }

    /// Preview → Pending.
    pub fn set_pending(&self, id: PaymentId, now: DateTime<Utc>) -> Result<Vec<PaymentGroupEvent>> {
        let payment = self.payment(id)?;
        if !payment.status.can_set_pending() {
            return Err(DomainError::invalid_status("Payment", payment.status, "set pending"));
        }
        Ok(vec![status_changed(payment, PaymentStatus::Pending, now, None)])
    }

    /// Pending or Reviewing → Paid.
    pub fn pay(
        &self,
        id: PaymentId,
        value: Option<Money>,
        paid_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentGroupEvent>> {
        let payment = self.payment(id)?;
        self.check_payable(payment)?;
        let paid_value = value.unwrap_or(payment.value);
        if paid_value.is_negative() {
            return Err(DomainError::InvalidValue(format!(
                "paid value cannot be negative, got {paid_value}"
            )));
        }
        Ok(vec![PaymentGroupEvent::PaymentStatusChanged(
            PaymentStatusChangedData {
                payment_id: id,
                old: payment.status,
                new: PaymentStatus::Paid,
                paid_value: Some(paid_value),
                paid_date: Some(paid_date.unwrap_or(now)),
                date: now,
                reason: None,
            },
        )])
    }

    /// Pending → Reviewing.
    pub fn review(&self, id: PaymentId, now: DateTime<Utc>) -> Result<Vec<PaymentGroupEvent>> {
        let payment = self.payment(id)?;
        if !payment.status.can_review() {
            return Err(DomainError::invalid_status("Payment", payment.status, "review"));
        }
        Ok(vec![status_changed(payment, PaymentStatus::Reviewing, now, None)])
    }

    pub fn cancel(
        &self,
        id: PaymentId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentGroupEvent>> {
        let payment = self.payment(id)?;
        if payment.is_cancelled() {
            return Err(DomainError::AlreadyCancelled);
        }
        if !payment.status.can_cancel() {
            return Err(DomainError::invalid_status("Payment", payment.status, "cancel"));
        }
        Ok(vec![status_changed(payment, PaymentStatus::Cancelled, now, reason)])
    }

    /// Administrative un-pay: Paid → Pending, clearing the paid fields.
    pub fn set_not_paid(
        &self,
        id: PaymentId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentGroupEvent>> {
        if reason.trim().is_empty() {
            return Err(DomainError::NeedReason {
                action: "set a payment as not paid",
            });
        }
        let payment = self.payment(id)?;
        if !payment.status.can_set_not_paid() {
            return Err(DomainError::invalid_status("Payment", payment.status, "set not paid"));
        }
        Ok(vec![status_changed(
            payment,
            PaymentStatus::Pending,
            now,
            Some(reason.to_string()),
        )])
    }

    pub fn change_due_date(
        &self,
        id: PaymentId,
        due_date: NaiveDate,
        reason: &str,
    ) -> Result<Vec<PaymentGroupEvent>> {
        if reason.trim().is_empty() {
            return Err(DomainError::NeedReason {
                action: "change a due date",
            });
        }
        let payment = self.payment(id)?;
        if payment.is_paid() || payment.is_cancelled() {
            return Err(DomainError::invalid_status(
                "Payment",
                payment.status,
                "change the due date of",
            ));
        }
        if payment.due_date == due_date {
            return Ok(Vec::new());
        }
        Ok(vec![PaymentGroupEvent::DueDateChanged(DueDateChangedData {
            payment_id: id,
            old: payment.due_date,
            new: due_date,
            reason: reason.to_string(),
        })])
    }

    /// Every Preview payment → Pending.
    pub fn confirm(&self, now: DateTime<Utc>) -> Result<Vec<PaymentGroupEvent>> {
        Ok(self
            .payments
            .iter()
            .filter(|p| p.status.can_set_pending())
            .map(|p| status_changed(p, PaymentStatus::Pending, now, None))
            .collect())
    }

    /// Every Pending or Reviewing payment → Paid at its own value.
    pub fn pay_all(&self, now: DateTime<Utc>) -> Result<Vec<PaymentGroupEvent>> {
        let mut events = Vec::new();
        for payment in self.payments.iter().filter(|p| p.status.can_pay()) {
            events.extend(self.pay(payment.id, None, None, now)?);
        }
        Ok(events)
    }

    /// Cancels every payment that is neither paid nor cancelled.
    pub fn cancel_all(
        &self,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentGroupEvent>> {
        Ok(self
            .payments
            .iter()
            .filter(|p| p.status.can_cancel())
            .map(|p| status_changed(p, PaymentStatus::Cancelled, now, reason.clone()))
            .collect())
    }

    pub fn set_payer(&self, client_id: ClientId) -> Result<Vec<PaymentGroupEvent>> {
        match self.payer {
            Some(current) if current == client_id => Ok(Vec::new()),
            Some(_) => Err(DomainError::ThirdpartyLocked { role: "payer" }),
            None => Ok(vec![PaymentGroupEvent::PayerSet { client_id }]),
        }
    }

    pub fn set_recipient(&self, client_id: ClientId) -> Result<Vec<PaymentGroupEvent>> {
        match self.recipient {
            Some(current) if current == client_id => Ok(Vec::new()),
            Some(_) => Err(DomainError::ThirdpartyLocked { role: "recipient" }),
            None => Ok(vec![PaymentGroupEvent::RecipientSet { client_id }]),
        }
    }

    pub fn set_card_data(&self, id: PaymentId, data: CardData) -> Result<Vec<PaymentGroupEvent>> {
        let payment = self.payment(id)?;
        if payment.method_kind != PaymentMethodKind::Card {
            return Err(DomainError::InvalidValue(format!(
                "card data on a {} payment",
                payment.method_kind
            )));
        }
        Ok(vec![PaymentGroupEvent::CardDataSet {
            payment_id: id,
            data,
        }])
    }

    pub fn set_check_data(&self, id: PaymentId, data: CheckData) -> Result<Vec<PaymentGroupEvent>> {
        let payment = self.payment(id)?;
        if payment.method_kind != PaymentMethodKind::Check {
            return Err(DomainError::InvalidValue(format!(
                "check data on a {} payment",
                payment.method_kind
            )));
        }
        Ok(vec![PaymentGroupEvent::CheckDataSet {
            payment_id: id,
            data,
        }])
    }

    fn check_payable(&self, payment: &Payment) -> Result<()> {
        if !payment.status.can_pay() {
            return Err(DomainError::invalid_status("Payment", payment.status, "pay"));
        }
        if self.kind == GroupKind::Sale
            && payment.direction == PaymentDirection::In
            && payment.method_kind.requires_payer()
            && self.payer.is_none()
        {
            return Err(DomainError::MissingPayer {
                method: payment.method_kind.as_str(),
            });
        }
        Ok(())
    }
}

fn status_changed(
    payment: &Payment,
    new: PaymentStatus,
    now: DateTime<Utc>,
    reason: Option<String>,
) -> PaymentGroupEvent {
    PaymentGroupEvent::PaymentStatusChanged(PaymentStatusChangedData {
        payment_id: payment.id,
        old: payment.status,
        new,
        paid_value: None,
        paid_date: None,
        date: now,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn group_with(kind: GroupKind, method_kind: PaymentMethodKind) -> (PaymentGroup, PaymentId) {
        let mut group = PaymentGroup::new(kind, BranchId::new(), "test");
        let payment = Payment {
            id: PaymentId::new(),
            identifier: 1,
            group_id: group.id,
            branch_id: group.branch_id,
            method_id: PaymentMethodId::new(),
            method_kind,
            direction: PaymentDirection::In,
            status: PaymentStatus::Preview,
            value: Money::from_cents(3000),
            description: "1/1".to_string(),
            due_date: now().date_naive(),
            open_date: now(),
            paid_date: None,
            paid_value: None,
            cancel_date: None,
            card_data: None,
            check_data: None,
        };
        let id = payment.id;
        let events = group.add_payment(payment).unwrap();
        group.apply_events(events);
        (group, id)
    }

    fn run(
        group: &mut PaymentGroup,
        command: impl FnOnce(&PaymentGroup) -> Result<Vec<PaymentGroupEvent>>,
    ) -> Result<()> {
        let events = command(group)?;
        group.apply_events(events);
        Ok(())
    }

    #[test]
    fn test_preview_pending_paid() {
        let (mut group, id) = group_with(GroupKind::Sale, PaymentMethodKind::Money);
        run(&mut group, |g| g.confirm(now())).unwrap();
        assert_eq!(group.payment(id).unwrap().status, PaymentStatus::Pending);

        run(&mut group, |g| g.pay(id, None, None, now())).unwrap();
        let payment = group.payment(id).unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.paid_value, Some(Money::from_cents(3000)));
        assert_eq!(payment.paid_date, Some(now()));
        assert_eq!(group.total_paid(), Money::from_cents(3000));
        assert_eq!(group.total_to_pay(), Money::zero());
    }

    #[test]
    fn test_preview_cannot_be_paid() {
        let (group, id) = group_with(GroupKind::Sale, PaymentMethodKind::Money);
        assert!(matches!(
            group.pay(id, None, None, now()),
            Err(DomainError::InvalidStatus { .. })
        ));
    }

    #[test]
    fn test_cancel_twice_fails() {
        let (mut group, id) = group_with(GroupKind::Sale, PaymentMethodKind::Money);
        run(&mut group, |g| g.cancel(id, Some("gave up".into()), now())).unwrap();
        let payment = group.payment(id).unwrap();
        assert_eq!(payment.cancel_date, Some(now()));
        assert_eq!(group.total(), Money::zero());
        assert!(matches!(
            group.cancel(id, None, now()),
            Err(DomainError::AlreadyCancelled)
        ));
    }

    #[test]
    fn test_review_then_pay() {
        let (mut group, id) = group_with(GroupKind::Sale, PaymentMethodKind::Money);
        run(&mut group, |g| g.set_pending(id, now())).unwrap();
        run(&mut group, |g| g.review(id, now())).unwrap();
        assert_eq!(group.payment(id).unwrap().status, PaymentStatus::Reviewing);
        run(&mut group, |g| g.pay(id, Some(Money::from_cents(2900)), None, now())).unwrap();
        assert_eq!(
            group.payment(id).unwrap().paid_value,
            Some(Money::from_cents(2900))
        );
    }

    #[test]
    fn test_set_not_paid_clears_paid_fields() {
        let (mut group, id) = group_with(GroupKind::Sale, PaymentMethodKind::Money);
        run(&mut group, |g| g.confirm(now())).unwrap();
        run(&mut group, |g| g.pay(id, None, None, now())).unwrap();
        assert!(matches!(
            group.set_not_paid(id, "", now()),
            Err(DomainError::NeedReason { .. })
        ));
        run(&mut group, |g| g.set_not_paid(id, "bounced", now())).unwrap();

        let payment = group.payment(id).unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.paid_value, None);
        assert_eq!(payment.paid_date, None);
    }

    #[test]
    fn test_paid_payments_survive_cancel_all() {
        let (mut group, id) = group_with(GroupKind::Sale, PaymentMethodKind::Money);
        run(&mut group, |g| g.confirm(now())).unwrap();
        run(&mut group, |g| g.pay(id, None, None, now())).unwrap();
        let events = group.cancel_all(None, now()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_payer_is_locked_once_set() {
        let (mut group, _) = group_with(GroupKind::Sale, PaymentMethodKind::Money);
        let client = ClientId::new();
        run(&mut group, |g| g.set_payer(client)).unwrap();
        assert!(group.set_payer(client).unwrap().is_empty());
        assert!(matches!(
            group.set_payer(ClientId::new()),
            Err(DomainError::ThirdpartyLocked { role: "payer" })
        ));
    }

    #[test]
    fn test_bill_needs_payer_on_sales() {
        let (mut group, id) = group_with(GroupKind::Sale, PaymentMethodKind::Bill);
        run(&mut group, |g| g.confirm(now())).unwrap();
        assert!(matches!(
            group.pay(id, None, None, now()),
            Err(DomainError::MissingPayer { method: "bill" })
        ));
        run(&mut group, |g| g.set_payer(ClientId::new())).unwrap();
        assert!(group.pay(id, None, None, now()).is_ok());
    }

    #[test]
    fn test_card_data_only_on_card_payments() {
        let (group, id) = group_with(GroupKind::Sale, PaymentMethodKind::Money);
        let data = CardData::new("Cielo", crate::payment::CardType::Credit);
        assert!(group.set_card_data(id, data).is_err());
    }

    #[test]
    fn test_late_fees_on_read() {
        let (group, id) = group_with(GroupKind::Sale, PaymentMethodKind::Bill);
        let method = PaymentMethod::new(PaymentMethodKind::Bill, "Bill")
            .with_late_fees(dec!(2), dec!(0.1));
        let payment = group.payment(id).unwrap();
        let today = payment.due_date;

        assert_eq!(payment.penalty(&method, today), Money::zero());
        assert_eq!(payment.interest(&method, today), Money::zero());

        let later = today + Duration::days(10);
        assert_eq!(payment.days_late(later), 10);
        assert_eq!(payment.penalty(&method, later), Money::from_cents(60));
        assert_eq!(payment.interest(&method, later), Money::from_cents(30));
    }

    #[test]
    fn test_change_due_date_needs_reason() {
        let (mut group, id) = group_with(GroupKind::Sale, PaymentMethodKind::Bill);
        let new_date = now().date_naive() + Duration::days(30);
        assert!(matches!(
            group.change_due_date(id, new_date, " "),
            Err(DomainError::NeedReason { .. })
        ));
        run(&mut group, |g| g.change_due_date(id, new_date, "client asked")).unwrap();
        assert_eq!(group.payment(id).unwrap().due_date, new_date);
    }
}
