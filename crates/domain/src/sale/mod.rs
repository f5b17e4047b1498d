//! Sales, their items, returns and commissions.

mod aggregate;
mod events;
mod service;
mod state;

pub use aggregate::{Commission, ReturnedSale, ReturnedSaleItem, Sale, SaleItem};
pub use events::{SaleEvent, SaleStatusChangedData};
pub use service::SaleService;
pub use state::SaleStatus;
