//! Till service: opening, closing and the till ledger.

use common::{Money, PaymentId, StationId, TillEntryId, TillId};

use crate::catalog::CatalogService;
use crate::config::CoreConfig;
use crate::error::{DomainError, Result};
use crate::history::{HistoryEntry, HistorySubject};
use crate::payment::{PaymentDirection, PaymentService, PaymentStatus};
use crate::store::{IdentifierKind, Transaction};

use super::{PaymentRef, Till, TillEntry, TillStatus};

/// Service for managing tills.
#[derive(Debug, Clone, Default)]
pub struct TillService {
    config: CoreConfig,
    payments: PaymentService,
    catalog: CatalogService,
}

impl TillService {
    pub fn new(config: CoreConfig, payments: PaymentService) -> Self {
        Self {
            config,
            payments,
            catalog: CatalogService::new(),
        }
    }

    pub fn till(&self, tx: &Transaction, id: TillId) -> Result<Till> {
        tx.load(id)
    }

    /// The open till of a station, if any.
    pub fn current(&self, tx: &Transaction, station_id: StationId) -> Result<Option<Till>> {
        let mut open = tx.find::<Till>(|t| t.station_id == station_id && t.status == TillStatus::Open);
        if open.len() > 1 {
            return Err(DomainError::DatabaseInconsistency(format!(
                "station {station_id} has {} open tills",
                open.len()
            )));
        }
        Ok(open.pop())
    }

    /// The most recently closed till of a station.
    pub fn last_closed(&self, tx: &Transaction, station_id: StationId) -> Option<Till> {
        tx.find::<Till>(|t| t.station_id == station_id && t.status == TillStatus::Closed)
            .into_iter()
            .max_by_key(|t| (t.closing_date, t.identifier))
    }

    /// Opens a till on a station, carrying the cash of the last closed one.
    #[tracing::instrument(skip(self, tx))]
    pub fn open_till(&self, tx: &mut Transaction, station_id: StationId) -> Result<TillId> {
        tx.run(|tx| {
            let station = self.catalog.station(tx, station_id)?;
            if station.branch_id != tx.branch() {
                return Err(DomainError::WrongBranch);
            }
            if !station.is_active {
                return Err(DomainError::InvalidValue(format!(
                    "station {} is not active",
                    station.name
                )));
            }
            if self.current(tx, station_id)?.is_some() {
                return Err(DomainError::TillAlreadyOpen);
            }
            let today = tx.today();
            if !tx
                .find::<Till>(|t| t.station_id == station_id && t.opened_on(today))
                .is_empty()
            {
                return Err(DomainError::TillAlreadyClosedToday);
            }

            let initial_cash = self
                .last_closed(tx, station_id)
                .and_then(|t| t.final_cash_amount)
                .unwrap_or_default();

            let identifier = tx.next_identifier(IdentifierKind::Till);
            let till = Till::new(identifier, station_id, station.branch_id);
            let id = till.id;
            tx.save(till);

            let (now, actor) = (tx.now(), tx.actor());
            tx.execute::<Till, _>(id, |till| till.open(initial_cash, now, actor))?;

            metrics::counter!("tills_opened_total").increment(1);
            tracing::info!(till = %id, identifier, initial_cash = %initial_cash, "till opened");
            Ok(id)
        })
    }

    #[tracing::instrument(skip(self, tx))]
    pub fn close_till(
        &self,
        tx: &mut Transaction,
        till_id: TillId,
        observations: Option<&str>,
    ) -> Result<Money> {
        tx.run(|tx| {
            let (now, actor) = (tx.now(), tx.actor());
            let observations = observations.map(str::to_string);
            let result = tx.execute::<Till, _>(till_id, |till| till.close(observations, now, actor))?;
            let final_cash = result.aggregate.final_cash_amount.unwrap_or_default();

            metrics::counter!("tills_closed_total").increment(1);
            tracing::info!(till = %till_id, final_cash = %final_cash, "till closed");
            Ok(final_cash)
        })
    }

    /// Records a paid payment in the till: +value for IN, -value for OUT.
    ///
    /// A payment already standing in a till is refused until reversed.
    #[tracing::instrument(skip(self, tx))]
    pub fn add_entry(
        &self,
        tx: &mut Transaction,
        till_id: TillId,
        payment_id: PaymentId,
    ) -> Result<TillEntryId> {
        tx.run(|tx| {
            let payment = self.payments.payment(tx, payment_id)?;
            if payment.status != PaymentStatus::Paid {
                return Err(DomainError::invalid_status(
                    "Payment",
                    payment.status,
                    "register in a till",
                ));
            }
            if let Some((till, _)) = self.registration(tx, payment_id) {
                return Err(DomainError::AlreadyInTill { till });
            }
            let reference = PaymentRef {
                payment_id,
                method_kind: payment.method_kind,
            };
            self.append(
                tx,
                till_id,
                payment.signed_value(),
                &payment.description,
                Some(reference),
            )
        })
    }

    /// A non-payment entry putting money into the till.
    pub fn add_credit_entry(
        &self,
        tx: &mut Transaction,
        till_id: TillId,
        value: Money,
        reason: &str,
    ) -> Result<TillEntryId> {
        tx.run(|tx| {
            if value.is_negative() {
                return Err(DomainError::InvalidValue(format!(
                    "credit entries cannot be negative, got {value}"
                )));
            }
            self.append(tx, till_id, value, reason, None)
        })
    }

    /// A non-payment entry taking money out of the till.
    pub fn add_debit_entry(
        &self,
        tx: &mut Transaction,
        till_id: TillId,
        value: Money,
        reason: &str,
    ) -> Result<TillEntryId> {
        tx.run(|tx| {
            if value.is_negative() {
                return Err(DomainError::InvalidValue(format!(
                    "debit entries cannot be negative, got {value}"
                )));
            }
            self.append(tx, till_id, -value, reason, None)
        })
    }

    /// Pays a payment (unless already paid) and registers it in the till.
    #[tracing::instrument(skip(self, tx))]
    pub fn pay_through_till(
        &self,
        tx: &mut Transaction,
        till_id: TillId,
        payment_id: PaymentId,
    ) -> Result<TillEntryId> {
        tx.run(|tx| {
            self.ensure_usable(tx, till_id)?;
            if self.payments.payment(tx, payment_id)?.status != PaymentStatus::Paid {
                self.payments.pay(tx, payment_id, None, None)?;
            }
            self.add_entry(tx, till_id, payment_id)
        })
    }

    /// Cancels the till registration of a payment that is no longer paid
    /// with an entry of the opposite value in the same till.
    ///
    /// The till must still be usable. Returns `None` when the payment was
    /// never registered or is already reversed.
    #[tracing::instrument(skip(self, tx))]
    pub fn reverse_entry(
        &self,
        tx: &mut Transaction,
        payment_id: PaymentId,
    ) -> Result<Option<TillEntryId>> {
        tx.run(|tx| {
            let Some((till_id, registered)) = self.registration(tx, payment_id) else {
                return Ok(None);
            };
            let payment = self.payments.payment(tx, payment_id)?;
            let reference = PaymentRef {
                payment_id,
                method_kind: payment.method_kind,
            };
            let id = self.append(
                tx,
                till_id,
                -registered,
                &format!("Reversal of {}", payment.description),
                Some(reference),
            )?;
            metrics::counter!("till_reversals_total").increment(1);
            tracing::info!(till = %till_id, payment = %payment_id, value = %registered, "till entry reversed");
            Ok(Some(id))
        })
    }

    /// Supplies the till with cash through a paid lonely money payment.
    #[tracing::instrument(skip(self, tx))]
    pub fn add_cash(
        &self,
        tx: &mut Transaction,
        till_id: TillId,
        value: Money,
        reason: &str,
    ) -> Result<PaymentId> {
        tx.run(|tx| {
            self.move_cash(tx, till_id, PaymentDirection::In, value, reason)
        })
    }

    /// Removes cash from the till through a paid lonely money payment.
    #[tracing::instrument(skip(self, tx))]
    pub fn remove_cash(
        &self,
        tx: &mut Transaction,
        till_id: TillId,
        value: Money,
        reason: &str,
    ) -> Result<PaymentId> {
        tx.run(|tx| {
            self.move_cash(tx, till_id, PaymentDirection::Out, value, reason)
        })
    }

    pub fn history(&self, tx: &Transaction, till_id: TillId) -> Vec<HistoryEntry> {
        tx.history(HistorySubject::Till(till_id))
    }

    fn move_cash(
        &self,
        tx: &mut Transaction,
        till_id: TillId,
        direction: PaymentDirection,
        value: Money,
        reason: &str,
    ) -> Result<PaymentId> {
        if !value.is_positive() {
            return Err(DomainError::InvalidValue(format!(
                "cash movements must be positive, got {value}"
            )));
        }
        self.ensure_usable(tx, till_id)?;
        let method = self.payments.money_method(tx)?;
        let payment_id = self
            .payments
            .create_lonely_payment(tx, method.id, direction, value, reason)?;
        self.pay_through_till(tx, till_id, payment_id)?;
        Ok(payment_id)
    }

    /// The till where a payment's entries do not cancel out, with their sum.
    fn registration(&self, tx: &Transaction, payment_id: PaymentId) -> Option<(TillId, Money)> {
        let of_payment = |e: &&TillEntry| e.payment.is_some_and(|p| p.payment_id == payment_id);
        tx.find::<Till>(|t| t.entries.iter().any(|e| of_payment(&e)))
            .into_iter()
            .map(|t| (t.id, t.entries.iter().filter(of_payment).map(|e| e.value).sum::<Money>()))
            .find(|(_, net)| !net.is_zero())
    }

    /// The till is open and, unless configured otherwise, from today.
    fn ensure_usable(&self, tx: &Transaction, till_id: TillId) -> Result<Till> {
        let till = self.till(tx, till_id)?;
        if till.status != TillStatus::Open {
            return Err(DomainError::TillNotOpen);
        }
        if !self.config.allow_outdated_operations && till.needs_closing(tx.today()) {
            return Err(DomainError::TillNeedsClosing);
        }
        Ok(till)
    }

    fn append(
        &self,
        tx: &mut Transaction,
        till_id: TillId,
        value: Money,
        description: &str,
        payment: Option<PaymentRef>,
    ) -> Result<TillEntryId> {
        let till = self.ensure_usable(tx, till_id)?;
        let entry = TillEntry {
            id: TillEntryId::new(),
            identifier: tx.next_identifier(IdentifierKind::TillEntry),
            till_id,
            value,
            description: description.to_string(),
            payment,
            branch_id: till.branch_id,
            date: tx.now(),
        };
        let id = entry.id;
        tx.execute::<Till, _>(till_id, |till| till.add_entry(entry.clone()))?;
        tx.record("till_entry", "Till", till_id.into(), &entry)?;
        tracing::debug!(till = %till_id, value = %value, "till entry added");
        Ok(id)
    }
}
