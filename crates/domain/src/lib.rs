//! Transactional core of the point of sale.
//!
//! This crate provides:
//! - Tills and their append-only ledger of entries
//! - Payments, payment groups and payment method policies
//! - Sales with stock decrease, returns, cancellation and commissions
//! - Work orders with stock reservations kept in sync with their sale
//! - A stock gateway and an audit history of every status change
//!
//! Every operation runs inside a [`Transaction`] opened from [`PosCore`].

pub mod aggregate;
pub mod audit;
pub mod catalog;
pub mod clock;
pub mod command;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod history;
pub mod payment;
pub mod sale;
pub mod stock;
pub mod store;
pub mod till;
pub mod workorder;

pub use aggregate::{Aggregate, DomainEvent};
pub use audit::AuditLog;
pub use catalog::{Batch, Branch, CatalogService, Client, SalesPerson, Sellable, Station, Storable};
pub use clock::{Clock, FixedClock, SystemClock};
pub use command::{CommandResult, Stored};
pub use config::CoreConfig;
pub use core::PosCore;
pub use error::{DomainError, Result};
pub use events::{CoreEvent, EventBus, EventHandler};
pub use history::{HistoryChange, HistoryEntry, HistorySubject};
pub use payment::{
    CardData, CardType, CheckData, GroupKind, Payment, PaymentDirection, PaymentGroup,
    PaymentMethod, PaymentMethodKind, PaymentService, PaymentStatus,
};
pub use sale::{Commission, ReturnedSale, ReturnedSaleItem, Sale, SaleItem, SaleService, SaleStatus};
pub use stock::{StockGateway, StockItem, StockKey, StockMovement, StockReason, StockTransactionHistory};
pub use store::{Database, SessionContext, Transaction};
pub use till::{Till, TillEntry, TillService, TillStatus};
pub use workorder::{WorkOrder, WorkOrderItem, WorkOrderService, WorkOrderStatus};
