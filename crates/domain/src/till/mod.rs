//! Tills and their ledger of entries.

mod aggregate;
mod observer;
mod service;
mod state;

pub use aggregate::{PaymentRef, Till, TillEntry, TillEvent};
pub use observer::PaymentReversalObserver;
pub use service::TillService;
pub use state::TillStatus;
