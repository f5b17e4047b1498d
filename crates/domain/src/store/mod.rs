//! Transactional in-process store of every core table.

mod database;
mod tables;

pub use database::{Database, SessionContext, Transaction};
pub use tables::{IdentifierKind, Tables};
