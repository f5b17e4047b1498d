//! Keeps a sale item and its linked work order item holding the same stock.
//!
//! Stock reserved by a work order counts as already taken for the sale, so
//! every sale-side stock movement first looks at what the linked item holds.

use common::{SaleId, SaleItemId, WorkOrderId};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::sale::{Sale, SaleItem};
use crate::store::Transaction;

use super::{WorkOrder, WorkOrderItem, WorkOrderStatus};

/// A work order item linked to a sale item.
#[derive(Debug, Clone)]
pub(crate) struct LinkedItem {
    pub work_order_id: WorkOrderId,
    pub item: WorkOrderItem,
}

/// The live work order item linked to a sale item, if any.
pub(crate) fn linked_item(
    tx: &Transaction,
    sale_id: SaleId,
    sale_item_id: SaleItemId,
) -> Option<LinkedItem> {
    tx.find::<WorkOrder>(|wo| wo.sale_id == Some(sale_id) && wo.status != WorkOrderStatus::Cancelled)
        .into_iter()
        .find_map(|wo| {
            wo.items
                .iter()
                .find(|i| i.sale_item_id == Some(sale_item_id))
                .map(|item| LinkedItem {
                    work_order_id: wo.id,
                    item: item.clone(),
                })
        })
}

/// Stock already out of the shelf for a sale item.
pub(crate) fn held_quantity(item: &SaleItem, linked: Option<&LinkedItem>) -> Decimal {
    linked
        .map(|l| l.item.quantity_decreased)
        .unwrap_or(Decimal::ZERO)
        .max(item.quantity_decreased)
}

/// Sets the held quantity on both sides, clamped to each item's quantity.
pub(crate) fn set_held(
    tx: &mut Transaction,
    sale_id: SaleId,
    item: &SaleItem,
    linked: Option<&LinkedItem>,
    quantity_decreased: Decimal,
) -> Result<()> {
    let on_sale = quantity_decreased.min(item.quantity).max(Decimal::ZERO);
    tx.execute::<Sale, _>(sale_id, |sale| sale.set_item_decreased(item.id, on_sale))?;
    if let Some(linked) = linked {
        let on_order = quantity_decreased.min(linked.item.quantity).max(Decimal::ZERO);
        tx.execute::<WorkOrder, _>(linked.work_order_id, |wo| {
            wo.set_item_decreased(linked.item.id, on_order)
        })?;
    }
    Ok(())
}

/// Copies a work order item's held quantity onto its sale item.
pub(crate) fn mirror_to_sale(tx: &mut Transaction, work_order: &WorkOrder, item: &WorkOrderItem) -> Result<()> {
    let (Some(sale_id), Some(sale_item_id)) = (work_order.sale_id, item.sale_item_id) else {
        return Ok(());
    };
    let sale = tx.load::<Sale>(sale_id)?;
    let sale_quantity = sale.item(sale_item_id)?.quantity;
    let held = item.quantity_decreased.min(sale_quantity);
    tx.execute::<Sale, _>(sale_id, |sale| sale.set_item_decreased(sale_item_id, held))?;
    Ok(())
}
