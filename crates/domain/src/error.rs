//! Domain error types.

use journal::JournalError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by core operations.
///
/// Any error aborts the enclosing transaction; nothing is retried.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The requested transition is illegal from the current state.
    #[error("Invalid status: cannot {action} a {entity} in {status} status")]
    InvalidStatus {
        entity: &'static str,
        status: String,
        action: &'static str,
    },

    /// The transition requires a non-empty reason.
    #[error("A reason is required to {action}")]
    NeedReason { action: &'static str },

    /// A decrease would drive a stock balance below zero.
    #[error("Insufficient stock for {sellable}: requested {requested}, available {available}")]
    InsufficientStock {
        sellable: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("There is already an open till on this station")]
    TillAlreadyOpen,

    #[error("A till was already opened today on this station")]
    TillAlreadyClosedToday,

    #[error("The till is not open")]
    TillNotOpen,

    #[error("Cannot close the till with a negative balance of {balance}")]
    TillNegativeBalance { balance: common::Money },

    /// The till was opened on a previous day and must be closed first.
    #[error("The till was opened on a previous day and needs to be closed")]
    TillNeedsClosing,

    #[error("Invalid interest {value}: {reason}")]
    InvalidInterest { value: Decimal, reason: String },

    #[error("Invalid installment count {count}: the method allows at most {max}")]
    InvalidInstallmentCount { count: usize, max: u32 },

    /// The sale has a live work order and the bypass was not requested.
    #[error("Sale has a coupled work order that must be cancelled first")]
    HasCoupledWorkOrder,

    /// The work order belongs to a sale and the bypass was not requested.
    #[error("Work order is coupled to a sale that must be cancelled first")]
    HasCoupledSale,

    #[error("Item is already fully reserved")]
    AlreadyReserved,

    #[error("Cannot reserve {requested}: only {remaining} left to reserve")]
    OverReserve { requested: Decimal, remaining: Decimal },

    #[error("Cannot return {requested}: only {reserved} reserved")]
    OverReturn { requested: Decimal, reserved: Decimal },

    #[error("Cannot return {requested} of a sale item: only {returnable} returnable")]
    OverSaleReturn {
        requested: Decimal,
        returnable: Decimal,
    },

    /// Work order close requires a coupled sale or every item fully reserved.
    #[error("Work order items are not fully reserved")]
    NotFullyReserved,

    /// The payer/recipient of a payment group is fixed once set.
    #[error("The {role} of this payment group is already set")]
    ThirdpartyLocked { role: &'static str },

    #[error("Payment is already cancelled")]
    AlreadyCancelled,

    /// A payment counts once in the tills until it is reversed.
    #[error("Payment is already registered in till {till}")]
    AlreadyInTill { till: common::TillId },

    /// The payment method requires a payer and the group has none.
    #[error("A payer is required to pay with {method}")]
    MissingPayer { method: &'static str },

    #[error("Sale payments sum to {payments} but the sale total is {total}")]
    PaymentTotalMismatch {
        payments: common::Money,
        total: common::Money,
    },

    #[error("Sale item for a batch-tracked product has no batch")]
    MissingBatch,

    #[error("Client is not active")]
    InactiveClient,

    /// The operation must run on the branch currently holding the document.
    #[error("Operation must run on the branch currently holding the document")]
    WrongBranch,

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(Decimal),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A stored invariant was found violated. Never repaired.
    #[error("Database inconsistency: {0}")]
    DatabaseInconsistency(String),

    /// An earlier operation in this transaction failed.
    #[error("Transaction was aborted by an earlier error")]
    TransactionAborted,

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub(crate) fn invalid_status(
        entity: &'static str,
        status: impl std::fmt::Display,
        action: &'static str,
    ) -> Self {
        DomainError::InvalidStatus {
            entity,
            status: status.to_string(),
            action,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, DomainError>;
