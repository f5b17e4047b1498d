use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, JournalError, JournalQuery, JournalRecord, Position, Result};

/// Options for appending a batch.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Head position the writer last observed. If set, the append fails with
    /// `ConcurrencyConflict` when another writer moved the head since.
    pub expected_head: Option<Position>,
}

impl AppendOptions {
    /// No head check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects the journal head to be exactly at `position`.
    pub fn expect_head(position: Position) -> Self {
        Self {
            expected_head: Some(position),
        }
    }
}

/// A stream of journal records.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<JournalRecord>> + Send>>;

/// Durable, append-only log of the rows the core never updates.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Journal: Send + Sync {
    /// Appends a batch atomically: either every record is stored or none is.
    ///
    /// Positions are assigned in batch order. Returns the new head.
    async fn append(&self, records: Vec<JournalRecord>, options: AppendOptions)
    -> Result<Position>;

    /// Records referring to one entity, in position order.
    async fn records_for_aggregate(&self, aggregate_id: AggregateId)
    -> Result<Vec<JournalRecord>>;

    /// Records matching a query, in position order.
    async fn query(&self, query: JournalQuery) -> Result<Vec<JournalRecord>>;

    /// Records of one logical table, in position order.
    async fn records_in_table(&self, table: &str) -> Result<Vec<JournalRecord>>;

    /// Streams every record in position order.
    async fn stream_all(&self) -> Result<RecordStream>;

    /// Position of the last appended record, `Position::start()` when empty.
    async fn head(&self) -> Result<Position>;
}

/// Validates a batch before appending.
pub fn validate_batch(records: &[JournalRecord]) -> Result<()> {
    if records.is_empty() {
        return Err(JournalError::InvalidBatch(
            "Cannot append an empty batch".to_string(),
        ));
    }

    for record in records {
        if record.table.is_empty() {
            return Err(JournalError::InvalidBatch(format!(
                "Record {} has no table",
                record.record_id
            )));
        }
        if record.position != Position::start() {
            return Err(JournalError::InvalidBatch(format!(
                "Record {} was already appended at position {}",
                record.record_id, record.position
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JournalRecord {
        JournalRecord::builder()
            .table("sale_history")
            .aggregate_type("Sale")
            .aggregate_id(AggregateId::new())
            .payload_raw(serde_json::json!({"what": "Status"}))
            .build()
            .unwrap()
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(
            validate_batch(&[]),
            Err(JournalError::InvalidBatch(_))
        ));
    }

    #[test]
    fn already_positioned_record_is_rejected() {
        let mut appended = record();
        appended.position = Position::new(7);
        assert!(validate_batch(&[record(), appended]).is_err());
    }

    #[test]
    fn fresh_records_pass() {
        assert!(validate_batch(&[record(), record()]).is_ok());
    }
}
