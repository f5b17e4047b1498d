//! Sale state machine.

use serde::{Deserialize, Serialize};

/// The status of a sale.
///
/// State transitions:
/// ```text
/// Opened ──confirm──► Confirmed ──pay──► Paid
///   │                    │  │              │
///   │                    │  └──return──────┴──► Returned
///   │                    └──renegotiate──► Renegotiated
///   └──cancel──► Cancelled ◄── (Confirmed, Paid)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SaleStatus {
    /// A quote; items may still change.
    #[default]
    Opened,
    Confirmed,
    Paid,
    Returned,
    Cancelled,
    Renegotiated,
    /// Held for approval. Kept for stored data; nothing moves here.
    Reviewing,
}

impl SaleStatus {
    pub fn can_modify_items(&self) -> bool {
        matches!(self, SaleStatus::Opened)
    }

    pub fn can_confirm(&self) -> bool {
        matches!(self, SaleStatus::Opened)
    }

    pub fn can_pay(&self) -> bool {
        matches!(self, SaleStatus::Confirmed)
    }

    pub fn can_return(&self) -> bool {
        matches!(self, SaleStatus::Confirmed | SaleStatus::Paid)
    }

    pub fn can_renegotiate(&self) -> bool {
        matches!(self, SaleStatus::Confirmed)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            SaleStatus::Opened | SaleStatus::Confirmed | SaleStatus::Paid | SaleStatus::Reviewing
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Opened => "Opened",
            SaleStatus::Confirmed => "Confirmed",
            SaleStatus::Paid => "Paid",
            SaleStatus::Returned => "Returned",
            SaleStatus::Cancelled => "Cancelled",
            SaleStatus::Renegotiated => "Renegotiated",
            SaleStatus::Reviewing => "Reviewing",
        }
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_quotes_are_editable() {
        assert!(SaleStatus::Opened.can_modify_items());
        assert!(!SaleStatus::Confirmed.can_modify_items());
        assert!(!SaleStatus::Paid.can_modify_items());
    }

    #[test]
    fn test_returned_and_cancelled_cannot_cancel() {
        assert!(SaleStatus::Confirmed.can_cancel());
        assert!(SaleStatus::Paid.can_cancel());
        assert!(!SaleStatus::Returned.can_cancel());
        assert!(!SaleStatus::Cancelled.can_cancel());
        assert!(!SaleStatus::Renegotiated.can_cancel());
    }

    #[test]
    fn test_return_after_confirm_or_pay() {
        assert!(!SaleStatus::Opened.can_return());
        assert!(SaleStatus::Confirmed.can_return());
        assert!(SaleStatus::Paid.can_return());
    }
}
