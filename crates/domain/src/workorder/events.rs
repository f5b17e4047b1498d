//! Work order domain events.

use chrono::{DateTime, Utc};
use common::{BatchId, BranchId, SaleId, SaleItemId, WorkOrderItemId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::history::HistoryChange;

use super::{WorkOrderItem, WorkOrderStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WorkOrderEvent {
    ItemAdded(WorkOrderItem),
    /// Stock held by an item after a reservation, a return or a sale sync.
    ItemStockChanged {
        item_id: WorkOrderItemId,
        quantity_decreased: Decimal,
    },
    ItemBatchSet {
        item_id: WorkOrderItemId,
        batch_id: BatchId,
        quantity: Decimal,
    },
    ItemLinked {
        item_id: WorkOrderItemId,
        sale_item_id: SaleItemId,
    },
    LinkedToSale {
        sale_id: SaleId,
    },
    StatusChanged(WorkOrderStatusChangedData),
    RejectionChanged {
        is_rejected: bool,
        reason: String,
    },
    CurrentBranchChanged {
        old: Option<BranchId>,
        new: Option<BranchId>,
        /// Display names for the history row.
        old_name: Option<String>,
        new_name: Option<String>,
    },
    NoteAdded {
        note: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderStatusChangedData {
    pub old: WorkOrderStatus,
    pub new: WorkOrderStatus,
    pub date: DateTime<Utc>,
    pub reason: Option<String>,
    /// Branch that executed the work, recorded on the first finish.
    pub execution_branch: Option<BranchId>,
}

fn yes_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}

impl DomainEvent for WorkOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WorkOrderEvent::ItemAdded(_) => "ItemAdded",
            WorkOrderEvent::ItemStockChanged { .. } => "ItemStockChanged",
            WorkOrderEvent::ItemBatchSet { .. } => "ItemBatchSet",
            WorkOrderEvent::ItemLinked { .. } => "ItemLinked",
            WorkOrderEvent::LinkedToSale { .. } => "LinkedToSale",
            WorkOrderEvent::StatusChanged(_) => "StatusChanged",
            WorkOrderEvent::RejectionChanged { .. } => "RejectionChanged",
            WorkOrderEvent::CurrentBranchChanged { .. } => "CurrentBranchChanged",
            WorkOrderEvent::NoteAdded { .. } => "NoteAdded",
        }
    }

    fn history(&self) -> Option<HistoryChange> {
        match self {
            WorkOrderEvent::StatusChanged(data) => Some(
                HistoryChange::new("Status")
                    .values(Some(data.old.as_str()), Some(data.new.as_str()))
                    .notes(data.reason.clone()),
            ),
            WorkOrderEvent::RejectionChanged {
                is_rejected,
                reason,
            } => Some(
                HistoryChange::new("Rejected")
                    .values(Some(yes_no(!is_rejected)), Some(yes_no(*is_rejected)))
                    .notes(Some(reason.clone())),
            ),
            WorkOrderEvent::CurrentBranchChanged {
                old_name, new_name, ..
            } => Some(
                HistoryChange::new("Current branch")
                    .values(old_name.as_deref(), new_name.as_deref()),
            ),
            WorkOrderEvent::NoteAdded { note } => {
                Some(HistoryChange::new("Notes").notes(Some(note.clone())))
            }
            _ => None,
        }
    }
}
