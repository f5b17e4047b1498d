//! Payment state machine.

use serde::{Deserialize, Serialize};

/// The status of a payment in its lifecycle.
///
/// State transitions:
/// ```text
/// Preview ──► Pending ──► Paid
///    │           │  ▲       │
///    │           ▼  │       └──(set_not_paid)──► Pending
///    │       Reviewing
///    │           │
///    └───────────┴──────► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    /// Created with its document, not yet binding.
    #[default]
    Preview,

    /// Binding and awaiting payment.
    Pending,

    /// Settled (terminal except for an administrative un-pay).
    Paid,

    /// Held for review before it can be paid.
    Reviewing,

    /// Settled and reconciled. Kept for stored data; nothing moves here.
    Confirmed,

    /// Cancelled (terminal state).
    Cancelled,
}

impl PaymentStatus {
    pub fn can_set_pending(&self) -> bool {
        matches!(self, PaymentStatus::Preview)
    }

    pub fn can_pay(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Reviewing)
    }

    pub fn can_review(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Preview | PaymentStatus::Pending | PaymentStatus::Reviewing
        )
    }

    pub fn can_set_not_paid(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }

    /// Paid or confirmed.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Preview => "Preview",
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Reviewing => "Reviewing",
            PaymentStatus::Confirmed => "Confirmed",
            PaymentStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether money comes in or goes out of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentDirection {
    In,
    Out,
}

impl PaymentDirection {
    /// +1 for incoming, -1 for outgoing.
    pub fn sign(&self) -> i64 {
        match self {
            PaymentDirection::In => 1,
            PaymentDirection::Out => -1,
        }
    }
}
