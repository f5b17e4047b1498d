//! Payments, payment groups and payment methods.

mod aggregate;
mod details;
mod events;
mod method;
mod service;
mod state;

pub use aggregate::{GroupKind, Payment, PaymentGroup};
pub use details::{CardData, CardType, CheckData};
pub use events::{DueDateChangedData, PaymentGroupEvent, PaymentStatusChangedData};
pub use method::{
    PaymentMethod, PaymentMethodKind, calculate_installment_value, installment_values,
};
pub use service::PaymentService;
pub use state::{PaymentDirection, PaymentStatus};
