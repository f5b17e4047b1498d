//! Sale domain events.

use chrono::{DateTime, Utc};
use common::{BatchId, ClientId, Money, PaymentGroupId, SaleItemId, TillId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::history::HistoryChange;

use super::{ReturnedSale, SaleItem, SaleStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SaleEvent {
    ItemAdded(SaleItem),
    ItemRemoved {
        item_id: SaleItemId,
    },
    ClientSet {
        client_id: ClientId,
    },
    TillSet {
        till_id: TillId,
    },
    SurchargeSet {
        value: Money,
    },
    DiscountSet {
        value: Money,
    },
    ItemStockChanged {
        item_id: SaleItemId,
        quantity_decreased: Decimal,
    },
    /// The item keeps `quantity` of `batch_id`; the rest moves to `new_items`.
    ItemSplit {
        item_id: SaleItemId,
        batch_id: BatchId,
        quantity: Decimal,
        new_items: Vec<SaleItem>,
    },
    StatusChanged(SaleStatusChangedData),
    Returned(Box<ReturnedSale>),
    Renegotiated {
        group_id: PaymentGroupId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleStatusChangedData {
    pub old: SaleStatus,
    pub new: SaleStatus,
    pub date: DateTime<Utc>,
    pub reason: Option<String>,
}

impl DomainEvent for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::ItemAdded(_) => "ItemAdded",
            SaleEvent::ItemRemoved { .. } => "ItemRemoved",
            SaleEvent::ClientSet { .. } => "ClientSet",
            SaleEvent::TillSet { .. } => "TillSet",
            SaleEvent::SurchargeSet { .. } => "SurchargeSet",
            SaleEvent::DiscountSet { .. } => "DiscountSet",
            SaleEvent::ItemStockChanged { .. } => "ItemStockChanged",
            SaleEvent::ItemSplit { .. } => "ItemSplit",
            SaleEvent::StatusChanged(_) => "StatusChanged",
            SaleEvent::Returned(_) => "Returned",
            SaleEvent::Renegotiated { .. } => "Renegotiated",
        }
    }

    fn history(&self) -> Option<HistoryChange> {
        match self {
            SaleEvent::StatusChanged(data) => Some(
                HistoryChange::new("Status")
                    .values(Some(data.old.as_str()), Some(data.new.as_str()))
                    .notes(data.reason.clone()),
            ),
            _ => None,
        }
    }
}
