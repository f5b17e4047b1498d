//! Work orders: repairs and services, optionally coupled to a sale.

mod aggregate;
mod events;
mod observer;
mod service;
mod state;
pub(crate) mod sync;

pub use aggregate::{WorkOrder, WorkOrderItem};
pub use events::{WorkOrderEvent, WorkOrderStatusChangedData};
pub use observer::SaleCancellationObserver;
pub use service::WorkOrderService;
pub use state::WorkOrderStatus;
