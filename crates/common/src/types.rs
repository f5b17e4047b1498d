use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of any row the journal records.
///
/// Every typed identifier below converts into an `AggregateId` so the journal
/// can index records without knowing the entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

impl AggregateId {
    /// Creates a new random aggregate ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an aggregate ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<AggregateId> for Uuid {
    fn from(id: AggregateId) -> Self {
        id.0
    }
}

/// Declares a UUID-backed identifier that cannot be mixed up with the others.
macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<$name> for AggregateId {
            fn from(id: $name) -> Self {
                AggregateId(id.0)
            }
        }
    };
}

typed_id!(
    /// A store location.
    BranchId
);
typed_id!(
    /// A workstation bound to one branch.
    StationId
);
typed_id!(TillId);
typed_id!(TillEntryId);
typed_id!(PaymentId);
typed_id!(PaymentGroupId);
typed_id!(PaymentMethodId);
typed_id!(SaleId);
typed_id!(SaleItemId);
typed_id!(ReturnedSaleId);
typed_id!(WorkOrderId);
typed_id!(WorkOrderItemId);
typed_id!(
    /// Anything that can be sold: a product or a service.
    SellableId
);
typed_id!(
    /// A production lot of a batch-tracked storable.
    BatchId
);
typed_id!(UserId);
typed_id!(ClientId);
typed_id!(SalesPersonId);
