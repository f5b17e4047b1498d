//! Till aggregate and its append-only ledger.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use common::{BranchId, Money, PaymentId, StationId, TillEntryId, TillId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::command::Stored;
use crate::error::{DomainError, Result};
use crate::events::CoreEvent;
use crate::history::{HistoryChange, HistorySubject};
use crate::payment::PaymentMethodKind;
use crate::store::Tables;

use super::TillStatus;

/// Weak link from an entry to the payment that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRef {
    pub payment_id: PaymentId,
    pub method_kind: PaymentMethodKind,
}

/// One immutable ledger line. Reversals are new entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TillEntry {
    pub id: TillEntryId,
    pub identifier: i64,
    pub till_id: TillId,
    /// Signed: positive money in, negative money out.
    pub value: Money,
    pub description: String,
    pub payment: Option<PaymentRef>,
    pub branch_id: BranchId,
    pub date: DateTime<Utc>,
}

impl TillEntry {
    /// Entries without a payment are cash supplies and removals.
    pub fn is_cash(&self) -> bool {
        self.payment
            .is_none_or(|p| p.method_kind == PaymentMethodKind::Money)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TillEvent {
    TillOpened {
        initial_cash_amount: Money,
        date: DateTime<Utc>,
        responsible: UserId,
    },
    EntryAdded(TillEntry),
    TillClosed {
        final_cash_amount: Money,
        date: DateTime<Utc>,
        responsible: UserId,
        observations: Option<String>,
    },
}

impl DomainEvent for TillEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TillEvent::TillOpened { .. } => "TillOpened",
            TillEvent::EntryAdded(_) => "EntryAdded",
            TillEvent::TillClosed { .. } => "TillClosed",
        }
    }

    fn history(&self) -> Option<HistoryChange> {
        match self {
            TillEvent::TillOpened { .. } => Some(
                HistoryChange::new("Status")
                    .values(Some(TillStatus::Pending.as_str()), Some(TillStatus::Open.as_str())),
            ),
            TillEvent::TillClosed { observations, .. } => Some(
                HistoryChange::new("Status")
                    .values(Some(TillStatus::Open.as_str()), Some(TillStatus::Closed.as_str()))
                    .notes(observations.clone()),
            ),
            TillEvent::EntryAdded(_) => None,
        }
    }
}

/// A cash register session on one station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Till {
    pub(crate) id: TillId,
    pub(crate) identifier: i64,
    pub(crate) station_id: StationId,
    pub(crate) branch_id: BranchId,
    pub(crate) status: TillStatus,
    pub(crate) initial_cash_amount: Money,
    pub(crate) final_cash_amount: Option<Money>,
    pub(crate) opening_date: Option<DateTime<Utc>>,
    pub(crate) closing_date: Option<DateTime<Utc>>,
    pub(crate) responsible_open: Option<UserId>,
    pub(crate) responsible_close: Option<UserId>,
    pub(crate) observations: Option<String>,
    pub(crate) entries: Vec<TillEntry>,
}

impl Till {
    pub fn new(identifier: i64, station_id: StationId, branch_id: BranchId) -> Self {
        Self {
            id: TillId::new(),
            identifier,
            station_id,
            branch_id,
            status: TillStatus::Pending,
            initial_cash_amount: Money::zero(),
            final_cash_amount: None,
            opening_date: None,
            closing_date: None,
            responsible_open: None,
            responsible_close: None,
            observations: None,
            entries: Vec::new(),
        }
    }
}

impl Aggregate for Till {
    type Id = TillId;
    type Event = TillEvent;

    fn aggregate_type() -> &'static str {
        "Till"
    }

    fn id(&self) -> TillId {
        self.id
    }

    fn apply(&mut self, event: TillEvent) {
        match event {
            TillEvent::TillOpened {
                initial_cash_amount,
                date,
                responsible,
            } => {
                self.status = TillStatus::Open;
                self.initial_cash_amount = initial_cash_amount;
                self.opening_date = Some(date);
                self.responsible_open = Some(responsible);
            }
            TillEvent::EntryAdded(entry) => self.entries.push(entry),
            TillEvent::TillClosed {
                final_cash_amount,
                date,
                responsible,
                observations,
            } => {
                self.status = TillStatus::Closed;
                self.final_cash_amount = Some(final_cash_amount);
                self.closing_date = Some(date);
                self.responsible_close = Some(responsible);
                self.observations = observations;
            }
        }
    }
}

impl Stored for Till {
    fn rows(tables: &Tables) -> &HashMap<TillId, Self> {
        &tables.tills
    }

    fn rows_mut(tables: &mut Tables) -> &mut HashMap<TillId, Self> {
        &mut tables.tills
    }

    fn history_subject(&self) -> Option<HistorySubject> {
        Some(HistorySubject::Till(self.id))
    }

    fn notification(&self, event: &TillEvent) -> Option<CoreEvent> {
        let (old, new) = match event {
            TillEvent::TillOpened { .. } => (TillStatus::Pending, TillStatus::Open),
            TillEvent::TillClosed { .. } => (TillStatus::Open, TillStatus::Closed),
            TillEvent::EntryAdded(_) => return None,
        };
        Some(CoreEvent::TillStatusChanged {
            till_id: self.id,
            old,
            new,
        })
    }
}

// Query methods
impl Till {
    pub fn identifier(&self) -> i64 {
        self.identifier
    }

    pub fn station_id(&self) -> StationId {
        self.station_id
    }

    pub fn branch_id(&self) -> BranchId {
        self.branch_id
    }

    pub fn status(&self) -> TillStatus {
        self.status
    }

    pub fn initial_cash_amount(&self) -> Money {
        self.initial_cash_amount
    }

    pub fn final_cash_amount(&self) -> Option<Money> {
        self.final_cash_amount
    }

    pub fn opening_date(&self) -> Option<DateTime<Utc>> {
        self.opening_date
    }

    pub fn closing_date(&self) -> Option<DateTime<Utc>> {
        self.closing_date
    }

    pub fn observations(&self) -> Option<&str> {
        self.observations.as_deref()
    }

    pub fn entries(&self) -> &[TillEntry] {
        &self.entries
    }

    /// Initial cash plus every entry.
    pub fn balance(&self) -> Money {
        self.initial_cash_amount + self.entries.iter().map(|e| e.value).sum::<Money>()
    }

    /// Initial cash plus entries that moved physical money.
    pub fn cash_amount(&self) -> Money {
        self.initial_cash_amount
            + self
                .entries
                .iter()
                .filter(|e| e.is_cash())
                .map(|e| e.value)
                .sum::<Money>()
    }

    pub fn credits_total(&self) -> Money {
        self.entries
            .iter()
            .filter(|e| e.value.is_positive())
            .map(|e| e.value)
            .sum()
    }

    pub fn debits_total(&self) -> Money {
        self.entries
            .iter()
            .filter(|e| e.value.is_negative())
            .map(|e| e.value.abs())
            .sum()
    }

    /// Open since a day before `today`.
    pub fn needs_closing(&self, today: NaiveDate) -> bool {
        self.status == TillStatus::Open
            && self
                .opening_date
                .is_some_and(|opened| opened.date_naive() < today)
    }

    pub(crate) fn opened_on(&self, day: NaiveDate) -> bool {
        self.opening_date
            .is_some_and(|opened| opened.date_naive() == day)
    }
}

// Command methods
impl Till {
    pub fn open(
        &self,
        initial_cash_amount: Money,
        now: DateTime<Utc>,
        responsible: UserId,
    ) -> Result<Vec<TillEvent>> {
        if self.status != TillStatus::Pending {
            return Err(DomainError::invalid_status("Till", self.status, "open"));
        }
        if initial_cash_amount.is_negative() {
            return Err(DomainError::InvalidValue(
                "initial cash amount cannot be negative".to_string(),
            ));
        }
        Ok(vec![TillEvent::TillOpened {
            initial_cash_amount,
            date: now,
            responsible,
        }])
    }

    pub fn add_entry(&self, entry: TillEntry) -> Result<Vec<TillEvent>> {
        if self.status != TillStatus::Open {
            return Err(DomainError::TillNotOpen);
        }
        Ok(vec![TillEvent::EntryAdded(entry)])
    }

    pub fn close(
        &self,
        observations: Option<String>,
        now: DateTime<Utc>,
        responsible: UserId,
    ) -> Result<Vec<TillEvent>> {
        if self.status != TillStatus::Open {
            return Err(DomainError::TillNotOpen);
        }
        let balance = self.balance();
        if balance.is_negative() {
            return Err(DomainError::TillNegativeBalance { balance });
        }
        Ok(vec![TillEvent::TillClosed {
            final_cash_amount: balance,
            date: now,
            responsible,
            observations,
        }])
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()
    }

    fn open_till(initial: Money) -> Till {
        let mut till = Till::new(1, StationId::new(), BranchId::new());
        let events = till.open(initial, now(), UserId::new()).unwrap();
        till.apply_events(events);
        till
    }

    fn entry(till: &Till, cents: i64, payment: Option<PaymentRef>) -> TillEntry {
        TillEntry {
            id: TillEntryId::new(),
            identifier: till.entries.len() as i64 + 1,
            till_id: till.id,
            value: Money::from_cents(cents),
            description: "entry".to_string(),
            payment,
            branch_id: till.branch_id,
            date: now(),
        }
    }

    fn add(till: &mut Till, cents: i64, payment: Option<PaymentRef>) {
        let entry = entry(till, cents, payment);
        let events = till.add_entry(entry).unwrap();
        till.apply_events(events);
    }

    #[test]
    fn test_balance_and_cash_amount() {
        let mut till = open_till(Money::from_cents(1000));
        add(&mut till, 3000, None);
        add(
            &mut till,
            5000,
            Some(PaymentRef {
                payment_id: PaymentId::new(),
                method_kind: PaymentMethodKind::Card,
            }),
        );
        add(&mut till, -500, None);

        assert_eq!(till.balance(), Money::from_cents(8500));
        assert_eq!(till.cash_amount(), Money::from_cents(3500));
        assert_eq!(till.credits_total(), Money::from_cents(8000));
        assert_eq!(till.debits_total(), Money::from_cents(500));
    }

    #[test]
    fn test_close_sets_final_cash() {
        let mut till = open_till(Money::zero());
        add(&mut till, 3000, None);
        let events = till.close(None, now(), UserId::new()).unwrap();
        till.apply_events(events);
        assert_eq!(till.status(), TillStatus::Closed);
        assert_eq!(till.final_cash_amount(), Some(Money::from_cents(3000)));
    }

    #[test]
    fn test_negative_balance_blocks_close() {
        let mut till = open_till(Money::from_cents(1000));
        add(&mut till, -2000, None);
        assert!(matches!(
            till.close(None, now(), UserId::new()),
            Err(DomainError::TillNegativeBalance { .. })
        ));
    }

    #[test]
    fn test_entries_need_an_open_till() {
        let till = Till::new(1, StationId::new(), BranchId::new());
        let entry = entry(&till, 100, None);
        assert!(matches!(till.add_entry(entry), Err(DomainError::TillNotOpen)));
    }

    #[test]
    fn test_needs_closing_after_midnight() {
        let till = open_till(Money::zero());
        assert!(!till.needs_closing(now().date_naive()));
        assert!(till.needs_closing((now() + Duration::days(1)).date_naive()));
    }

    #[test]
    fn test_open_and_close_are_recorded() {
        let opened = TillEvent::TillOpened {
            initial_cash_amount: Money::zero(),
            date: now(),
            responsible: UserId::new(),
        };
        let change = opened.history().unwrap();
        assert_eq!(change.what, "Status");
        assert_eq!(change.new_value.as_deref(), Some("Open"));
    }
}
