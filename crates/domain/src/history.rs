//! Append-only audit trail of status changes.

use chrono::{DateTime, Utc};
use common::{AggregateId, PaymentId, SaleId, TillId, UserId, WorkOrderId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The document a history row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum HistorySubject {
    Till(TillId),
    Payment(PaymentId),
    Sale(SaleId),
    WorkOrder(WorkOrderId),
}

impl HistorySubject {
    /// Journal table the rows of this subject go to.
    pub fn table(&self) -> &'static str {
        match self {
            HistorySubject::Till(_) => "till_history",
            HistorySubject::Payment(_) => "payment_change_history",
            HistorySubject::Sale(_) => "sale_history",
            HistorySubject::WorkOrder(_) => "work_order_history",
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        match self {
            HistorySubject::Till(_) => "Till",
            HistorySubject::Payment(_) => "Payment",
            HistorySubject::Sale(_) => "Sale",
            HistorySubject::WorkOrder(_) => "WorkOrder",
        }
    }

    pub fn aggregate_id(&self) -> AggregateId {
        match *self {
            HistorySubject::Till(id) => id.into(),
            HistorySubject::Payment(id) => id.into(),
            HistorySubject::Sale(id) => id.into(),
            HistorySubject::WorkOrder(id) => id.into(),
        }
    }
}

/// A change an event wants recorded, before actor and time are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryChange {
    /// Overrides the subject derived from the aggregate (payments inside a group).
    pub subject: Option<HistorySubject>,
    pub what: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub notes: Option<String>,
}

impl HistoryChange {
    pub fn new(what: impl Into<String>) -> Self {
        Self {
            subject: None,
            what: what.into(),
            old_value: None,
            new_value: None,
            notes: None,
        }
    }

    pub fn subject(mut self, subject: HistorySubject) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn values(mut self, old: Option<&str>, new: Option<&str>) -> Self {
        self.old_value = old.map(str::to_string);
        self.new_value = new.map(str::to_string);
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes.filter(|n| !n.is_empty());
        self
    }
}

/// One immutable audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub subject: HistorySubject,
    pub date: DateTime<Utc>,
    pub actor: UserId,
    pub what: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub notes: Option<String>,
}

impl HistoryEntry {
    pub(crate) fn from_change(
        subject: HistorySubject,
        change: HistoryChange,
        actor: UserId,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: change.subject.unwrap_or(subject),
            date,
            actor,
            what: change.what,
            old_value: change.old_value,
            new_value: change.new_value,
            notes: change.notes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_subject_overrides_aggregate_subject() {
        let payment = PaymentId::new();
        let change = HistoryChange::new("Status")
            .subject(HistorySubject::Payment(payment))
            .values(Some("Preview"), Some("Pending"));

        let entry = HistoryEntry::from_change(
            HistorySubject::Sale(SaleId::new()),
            change,
            UserId::new(),
            Utc::now(),
        );
        assert_eq!(entry.subject, HistorySubject::Payment(payment));
        assert_eq!(entry.subject.table(), "payment_change_history");
        assert_eq!(entry.old_value.as_deref(), Some("Preview"));
    }

    #[test]
    fn empty_notes_are_dropped() {
        let change = HistoryChange::new("Status").notes(Some(String::new()));
        assert_eq!(change.notes, None);
    }
}
