//! Payment service: methods, groups and payment transitions.

use chrono::{DateTime, NaiveDate, Utc};
use common::{ClientId, Money, PaymentGroupId, PaymentId, PaymentMethodId};
use rust_decimal::Decimal;

use crate::command::CommandResult;
use crate::config::CoreConfig;
use crate::error::{DomainError, Result};
use crate::history::{HistoryEntry, HistorySubject};
use crate::store::{IdentifierKind, Transaction};

use super::{
    CardData, CheckData, GroupKind, Payment, PaymentDirection, PaymentGroup, PaymentMethod,
    PaymentMethodKind, PaymentStatus, installment_values,
};

/// Service for managing payments.
///
/// Every payment lives in a [`PaymentGroup`]; transitions are executed on
/// the owning group so history and notifications stay in one place.
#[derive(Debug, Clone, Default)]
pub struct PaymentService {
    config: CoreConfig,
}

impl PaymentService {
    pub fn new(config: CoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn add_method(&self, tx: &mut Transaction, method: PaymentMethod) -> Result<PaymentMethodId> {
        tx.run(|tx| {
            method.validate_interest(method.interest, &CoreConfig::default())?;
            let id = method.id;
            tx.tables_mut().payment_methods.insert(id, method);
            Ok(id)
        })
    }

    pub fn method(&self, tx: &Transaction, id: PaymentMethodId) -> Result<PaymentMethod> {
        tx.tables()
            .payment_methods
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("PaymentMethod", id))
    }

    /// The active money method used for till supplies and refunds.
    pub fn money_method(&self, tx: &Transaction) -> Result<PaymentMethod> {
        tx.tables()
            .payment_methods
            .values()
            .filter(|m| m.kind == PaymentMethodKind::Money && m.is_active)
            .min_by_key(|m| m.id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("PaymentMethod", PaymentMethodKind::Money))
    }

    #[tracing::instrument(skip(self, tx))]
    pub fn create_group(
        &self,
        tx: &mut Transaction,
        kind: GroupKind,
        description: &str,
    ) -> Result<PaymentGroupId> {
        tx.run(|tx| {
            let group = PaymentGroup::new(kind, tx.branch(), description);
            let id = group.id;
            tx.save(group);
            Ok(id)
        })
    }

    pub fn group(&self, tx: &Transaction, id: PaymentGroupId) -> Result<PaymentGroup> {
        tx.load(id)
    }

    /// The group owning a payment.
    pub fn group_of(&self, tx: &Transaction, payment_id: PaymentId) -> Result<PaymentGroupId> {
        tx.tables()
            .payment_index
            .get(&payment_id)
            .copied()
            .ok_or_else(|| DomainError::not_found("Payment", payment_id))
    }

    pub fn payment(&self, tx: &Transaction, payment_id: PaymentId) -> Result<Payment> {
        let group = self.group(tx, self.group_of(tx, payment_id)?)?;
        group.payment(payment_id).cloned()
    }

    /// Creates one Preview payment in a group.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip(self, tx))]
    pub fn create_payment(
        &self,
        tx: &mut Transaction,
        group_id: PaymentGroupId,
        method_id: PaymentMethodId,
        direction: PaymentDirection,
        value: Money,
        due_date: NaiveDate,
        description: &str,
    ) -> Result<PaymentId> {
        tx.run(|tx| {
            let method = self.method(tx, method_id)?;
            let identifier = tx.next_identifier(IdentifierKind::Payment);
            let payment = Payment {
                id: PaymentId::new(),
                identifier,
                group_id,
                branch_id: tx.branch(),
                method_id,
                method_kind: method.kind,
                direction,
                status: PaymentStatus::Preview,
                value,
                description: description.to_string(),
                due_date,
                open_date: tx.now(),
                paid_date: None,
                paid_value: None,
                cancel_date: None,
                card_data: None,
                check_data: None,
            };
            let id = payment.id;
            tx.execute::<PaymentGroup, _>(group_id, |group| group.add_payment(payment))?;
            tx.tables_mut().payment_index.insert(id, group_id);
            metrics::counter!("payments_created_total", "method" => method.kind.as_str()).increment(1);
            Ok(id)
        })
    }

    /// Creates one payment per due date. Values sum to `value`, or to the
    /// interest-adjusted total when `interest` is not zero.
    ///
    /// The installment count is not checked against the method's maximum;
    /// callers use [`PaymentService::validate_installment_count`] for that.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip(self, tx, due_dates), fields(installments = due_dates.len()))]
    pub fn create_payments(
        &self,
        tx: &mut Transaction,
        group_id: PaymentGroupId,
        method_id: PaymentMethodId,
        direction: PaymentDirection,
        value: Money,
        due_dates: &[NaiveDate],
        interest: Decimal,
    ) -> Result<Vec<PaymentId>> {
        tx.run(|tx| {
            let method = self.method(tx, method_id)?;
            method.validate_interest(interest, &self.config)?;
            if !value.is_positive() {
                return Err(DomainError::InvalidValue(format!(
                    "payments must add up to a positive value, got {value}"
                )));
            }
            let count = u32::try_from(due_dates.len()).map_err(|_| {
                DomainError::InvalidInstallmentCount {
                    count: due_dates.len(),
                    max: u32::MAX,
                }
            })?;
            let values = installment_values(value, count, interest)?;

            let mut ids = Vec::with_capacity(values.len());
            for (index, (due_date, installment)) in due_dates.iter().zip(values).enumerate() {
                let description = format!("{}/{} {}", index + 1, count, method.description);
                ids.push(self.create_payment(
                    tx,
                    group_id,
                    method_id,
                    direction,
                    installment,
                    *due_date,
                    &description,
                )?);
            }
            Ok(ids)
        })
    }

    pub fn validate_installment_count(
        &self,
        tx: &Transaction,
        method_id: PaymentMethodId,
        count: usize,
    ) -> Result<()> {
        self.method(tx, method_id)?
            .validate_installment_count(count, &self.config)
    }

    /// A standalone Pending payment in its own group.
    #[tracing::instrument(skip(self, tx))]
    pub fn create_lonely_payment(
        &self,
        tx: &mut Transaction,
        method_id: PaymentMethodId,
        direction: PaymentDirection,
        value: Money,
        description: &str,
    ) -> Result<PaymentId> {
        tx.run(|tx| {
            let group_id = self.create_group(tx, GroupKind::Lonely, description)?;
            let today = tx.today();
            let id = self.create_payment(tx, group_id, method_id, direction, value, today, description)?;
            self.set_pending(tx, id)?;
            Ok(id)
        })
    }

    pub fn set_pending(&self, tx: &mut Transaction, payment_id: PaymentId) -> Result<()> {
        tx.run(|tx| {
            let now = tx.now();
            self.on_group(tx, payment_id, |g| g.set_pending(payment_id, now))
        })
    }

    /// Pays a payment; `value` and `paid_date` default to the payment's value and now.
    #[tracing::instrument(skip(self, tx))]
    pub fn pay(
        &self,
        tx: &mut Transaction,
        payment_id: PaymentId,
        value: Option<Money>,
        paid_date: Option<DateTime<Utc>>,
    ) -> Result<()> {
        tx.run(|tx| {
            let now = tx.now();
            self.on_group(tx, payment_id, |g| g.pay(payment_id, value, paid_date, now))?;
            metrics::counter!("payments_paid_total").increment(1);
            Ok(())
        })
    }

    pub fn review(&self, tx: &mut Transaction, payment_id: PaymentId) -> Result<()> {
        tx.run(|tx| {
            let now = tx.now();
            self.on_group(tx, payment_id, |g| g.review(payment_id, now))
        })
    }

    #[tracing::instrument(skip(self, tx))]
    pub fn cancel(
        &self,
        tx: &mut Transaction,
        payment_id: PaymentId,
        reason: Option<&str>,
    ) -> Result<()> {
        tx.run(|tx| {
            let now = tx.now();
            let reason = reason.map(str::to_string);
            self.on_group(tx, payment_id, |g| g.cancel(payment_id, reason, now))
        })
    }

    #[tracing::instrument(skip(self, tx))]
    pub fn set_not_paid(&self, tx: &mut Transaction, payment_id: PaymentId, reason: &str) -> Result<()> {
        tx.run(|tx| {
            let now = tx.now();
            self.on_group(tx, payment_id, |g| g.set_not_paid(payment_id, reason, now))
        })
    }

    pub fn change_due_date(
        &self,
        tx: &mut Transaction,
        payment_id: PaymentId,
        due_date: NaiveDate,
        reason: &str,
    ) -> Result<()> {
        tx.run(|tx| {
            self.on_group(tx, payment_id, |g| g.change_due_date(payment_id, due_date, reason))
        })
    }

    pub fn set_card_data(&self, tx: &mut Transaction, payment_id: PaymentId, data: CardData) -> Result<()> {
        tx.run(|tx| {
            self.on_group(tx, payment_id, |g| g.set_card_data(payment_id, data))
        })
    }

    pub fn set_check_data(
        &self,
        tx: &mut Transaction,
        payment_id: PaymentId,
        data: CheckData,
    ) -> Result<()> {
        tx.run(|tx| {
            self.on_group(tx, payment_id, |g| g.set_check_data(payment_id, data))
        })
    }

    /// Every Preview payment of the group → Pending.
    pub fn confirm_group(
        &self,
        tx: &mut Transaction,
        group_id: PaymentGroupId,
    ) -> Result<CommandResult<PaymentGroup>> {
        tx.run(|tx| {
            let now = tx.now();
            tx.execute::<PaymentGroup, _>(group_id, |g| g.confirm(now))
        })
    }

    /// Pays every Pending or Reviewing payment. Returns the ids paid now.
    pub fn pay_group(&self, tx: &mut Transaction, group_id: PaymentGroupId) -> Result<Vec<PaymentId>> {
        tx.run(|tx| {
            let now = tx.now();
            let result = tx.execute::<PaymentGroup, _>(group_id, |g| g.pay_all(now))?;
            let paid = result
                .events
                .iter()
                .filter_map(|event| match event {
                    super::PaymentGroupEvent::PaymentStatusChanged(data) => Some(data.payment_id),
                    _ => None,
                })
                .collect::<Vec<_>>();
            metrics::counter!("payments_paid_total").increment(paid.len() as u64);
            Ok(paid)
        })
    }

    /// Cancels every payment of the group that is not paid.
    pub fn cancel_group(
        &self,
        tx: &mut Transaction,
        group_id: PaymentGroupId,
        reason: Option<&str>,
    ) -> Result<CommandResult<PaymentGroup>> {
        tx.run(|tx| {
            let now = tx.now();
            let reason = reason.map(str::to_string);
            tx.execute::<PaymentGroup, _>(group_id, |g| g.cancel_all(reason, now))
        })
    }

    pub fn set_payer(&self, tx: &mut Transaction, group_id: PaymentGroupId, client: ClientId) -> Result<()> {
        tx.run(|tx| {
            tx.execute::<PaymentGroup, _>(group_id, |g| g.set_payer(client))?;
            Ok(())
        })
    }

    pub fn set_recipient(
        &self,
        tx: &mut Transaction,
        group_id: PaymentGroupId,
        client: ClientId,
    ) -> Result<()> {
        tx.run(|tx| {
            tx.execute::<PaymentGroup, _>(group_id, |g| g.set_recipient(client))?;
            Ok(())
        })
    }

    /// Penalty and interest owed today on an unpaid payment.
    pub fn late_charges(&self, tx: &Transaction, payment_id: PaymentId) -> Result<(Money, Money)> {
        let payment = self.payment(tx, payment_id)?;
        let method = self.method(tx, payment.method_id)?;
        let today = tx.today();
        Ok((
            payment.penalty(&method, today),
            payment.interest(&method, today),
        ))
    }

    pub fn history(&self, tx: &Transaction, payment_id: PaymentId) -> Vec<HistoryEntry> {
        tx.history(HistorySubject::Payment(payment_id))
    }

    fn on_group<F>(&self, tx: &mut Transaction, payment_id: PaymentId, command: F) -> Result<()>
    where
        F: FnOnce(&PaymentGroup) -> Result<Vec<super::PaymentGroupEvent>>,
    {
        let group_id = self.group_of(tx, payment_id)?;
        tx.execute::<PaymentGroup, _>(group_id, command)?;
        Ok(())
    }
}
