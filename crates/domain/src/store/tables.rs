use std::collections::HashMap;

use common::{
    BatchId, BranchId, ClientId, PaymentGroupId, PaymentId, PaymentMethodId, SaleId,
    SalesPersonId, SellableId, StationId, TillId, WorkOrderId,
};
use journal::Position;
use serde::{Deserialize, Serialize};

use crate::catalog::{Batch, Branch, Client, SalesPerson, Sellable, Station};
use crate::history::HistoryEntry;
use crate::payment::{PaymentGroup, PaymentMethod};
use crate::sale::{Commission, Sale};
use crate::stock::{StockItem, StockKey, StockTransactionHistory};
use crate::till::Till;
use crate::workorder::WorkOrder;

/// Entity kinds with a short per-branch human identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentifierKind {
    Till,
    TillEntry,
    Payment,
    Sale,
    ReturnedSale,
    WorkOrder,
}

/// Every row the core owns. A transaction works on a private copy.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub(crate) branches: HashMap<BranchId, Branch>,
    pub(crate) stations: HashMap<StationId, Station>,
    pub(crate) sellables: HashMap<SellableId, Sellable>,
    pub(crate) batches: HashMap<BatchId, Batch>,
    pub(crate) clients: HashMap<ClientId, Client>,
    pub(crate) sales_persons: HashMap<SalesPersonId, SalesPerson>,
    pub(crate) payment_methods: HashMap<PaymentMethodId, PaymentMethod>,

    pub(crate) tills: HashMap<TillId, Till>,
    pub(crate) payment_groups: HashMap<PaymentGroupId, PaymentGroup>,
    /// Owning group of every payment.
    pub(crate) payment_index: HashMap<PaymentId, PaymentGroupId>,
    pub(crate) sales: HashMap<SaleId, Sale>,
    pub(crate) work_orders: HashMap<WorkOrderId, WorkOrder>,

    pub(crate) stock: HashMap<StockKey, StockItem>,

    // append-only
    pub(crate) stock_history: Vec<StockTransactionHistory>,
    pub(crate) history: Vec<HistoryEntry>,
    pub(crate) commissions: Vec<Commission>,

    pub(crate) identifiers: HashMap<(IdentifierKind, BranchId), i64>,

    /// Journal head after the last commit, read from the journal on the first.
    pub(crate) journal_head: Option<Position>,
}

impl Tables {
    pub(crate) fn next_identifier(&mut self, kind: IdentifierKind, branch: BranchId) -> i64 {
        let counter = self.identifiers.entry((kind, branch)).or_insert(0);
        *counter += 1;
        *counter
    }
}
