pub mod money;
pub mod types;

pub use money::Money;
pub use types::{
    AggregateId, BatchId, BranchId, ClientId, PaymentGroupId, PaymentId, PaymentMethodId,
    ReturnedSaleId, SaleId, SaleItemId, SalesPersonId, SellableId, StationId, TillEntryId, TillId,
    UserId, WorkOrderId, WorkOrderItemId,
};
