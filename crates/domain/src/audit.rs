//! Reads of the journal: what committed transactions left behind.
//!
//! The transactional store only sees rows of the running process. The
//! journal also holds rows written before a restart or by another process
//! sharing it, so audits read from here.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{SellableId, TillId};
use futures_util::StreamExt;
use journal::{Journal, JournalQuery, JournalRecord, Position};
use serde::de::DeserializeOwned;

use crate::error::{DomainError, Result};
use crate::history::{HistoryEntry, HistorySubject};
use crate::sale::Commission;
use crate::stock::StockTransactionHistory;
use crate::till::TillEntry;

const TILL_ENTRY: &str = "till_entry";
const STOCK_HISTORY: &str = "stock_transaction_history";
const COMMISSION: &str = "commission";

/// Read-only view over the journal.
#[derive(Clone)]
pub struct AuditLog {
    journal: Arc<dyn Journal>,
}

impl AuditLog {
    pub fn new(journal: Arc<dyn Journal>) -> Self {
        Self { journal }
    }

    /// Committed history rows of one document, oldest first.
    pub async fn history(&self, subject: HistorySubject) -> Result<Vec<HistoryEntry>> {
        let query = JournalQuery::for_table(subject.table()).aggregate_id(subject.aggregate_id());
        decode_all(self.journal.query(query).await?)
    }

    /// Committed ledger lines of one till, reversals included.
    pub async fn till_entries(&self, till_id: TillId) -> Result<Vec<TillEntry>> {
        let records = self.journal.records_for_aggregate(till_id.into()).await?;
        decode_all(records.into_iter().filter(|r| r.table == TILL_ENTRY).collect())
    }

    /// Committed stock movements of a sellable across every branch.
    pub async fn stock_movements(&self, sellable_id: SellableId) -> Result<Vec<StockTransactionHistory>> {
        let query = JournalQuery::for_table(STOCK_HISTORY).aggregate_id(sellable_id);
        decode_all(self.journal.query(query).await?)
    }

    /// Every committed commission.
    pub async fn commissions(&self) -> Result<Vec<Commission>> {
        decode_all(self.journal.records_in_table(COMMISSION).await?)
    }

    /// Row count per journal table.
    pub async fn tally(&self) -> Result<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        let mut records = self.journal.stream_all().await?;
        while let Some(record) = records.next().await {
            *counts.entry(record?.table).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Position of the last committed row.
    pub async fn head(&self) -> Result<Position> {
        Ok(self.journal.head().await?)
    }
}

fn decode_all<T: DeserializeOwned>(records: Vec<JournalRecord>) -> Result<Vec<T>> {
    records
        .into_iter()
        .map(|record| serde_json::from_value(record.payload).map_err(DomainError::from))
        .collect()
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}
