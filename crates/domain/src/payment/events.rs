//! Payment group domain events.

use chrono::{DateTime, NaiveDate, Utc};
use common::{ClientId, Money, PaymentId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::history::{HistoryChange, HistorySubject};

use super::{CardData, CheckData, Payment, PaymentStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PaymentGroupEvent {
    PaymentAdded(Box<Payment>),
    PaymentStatusChanged(PaymentStatusChangedData),
    DueDateChanged(DueDateChangedData),
    PayerSet { client_id: ClientId },
    RecipientSet { client_id: ClientId },
    CardDataSet { payment_id: PaymentId, data: CardData },
    CheckDataSet { payment_id: PaymentId, data: CheckData },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusChangedData {
    pub payment_id: PaymentId,
    pub old: PaymentStatus,
    pub new: PaymentStatus,
    /// Set when moving to `Paid`.
    pub paid_value: Option<Money>,
    pub paid_date: Option<DateTime<Utc>>,
    pub date: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueDateChangedData {
    pub payment_id: PaymentId,
    pub old: NaiveDate,
    pub new: NaiveDate,
    pub reason: String,
}

impl DomainEvent for PaymentGroupEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentGroupEvent::PaymentAdded(_) => "PaymentAdded",
            PaymentGroupEvent::PaymentStatusChanged(_) => "PaymentStatusChanged",
            PaymentGroupEvent::DueDateChanged(_) => "DueDateChanged",
            PaymentGroupEvent::PayerSet { .. } => "PayerSet",
            PaymentGroupEvent::RecipientSet { .. } => "RecipientSet",
            PaymentGroupEvent::CardDataSet { .. } => "CardDataSet",
            PaymentGroupEvent::CheckDataSet { .. } => "CheckDataSet",
        }
    }

    fn history(&self) -> Option<HistoryChange> {
        match self {
            PaymentGroupEvent::PaymentStatusChanged(data) => Some(
                HistoryChange::new("Status")
                    .subject(HistorySubject::Payment(data.payment_id))
                    .values(Some(data.old.as_str()), Some(data.new.as_str()))
                    .notes(data.reason.clone()),
            ),
            PaymentGroupEvent::DueDateChanged(data) => Some(
                HistoryChange::new("Due date")
                    .subject(HistorySubject::Payment(data.payment_id))
                    .values(
                        Some(&data.old.format("%Y-%m-%d").to_string()),
                        Some(&data.new.format("%Y-%m-%d").to_string()),
                    )
                    .notes(Some(data.reason.clone())),
            ),
            _ => None,
        }
    }
}
