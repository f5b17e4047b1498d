use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, JournalError, JournalQuery, JournalRecord, Position, Result,
    journal::{AppendOptions, Journal, RecordStream, validate_batch},
};

/// In-memory journal used by tests and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryJournal {
    records: Arc<RwLock<Vec<JournalRecord>>>,
    reject_appends: Arc<AtomicBool>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records stored.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Makes every following append fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.reject_appends.store(unavailable, Ordering::SeqCst);
    }

    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl Journal for InMemoryJournal {
    async fn append(
        &self,
        records: Vec<JournalRecord>,
        options: AppendOptions,
    ) -> Result<Position> {
        validate_batch(&records)?;

        if self.reject_appends.load(Ordering::SeqCst) {
            return Err(JournalError::Unavailable(
                "journal is not accepting writes".to_string(),
            ));
        }

        let mut store = self.records.write().await;
        let head = Position::new(store.len() as i64);

        if let Some(expected) = options.expected_head
            && head != expected
        {
            return Err(JournalError::ConcurrencyConflict {
                expected,
                actual: head,
            });
        }

        let mut position = head;
        for mut record in records {
            position = position.next();
            record.position = position;
            store.push(record);
        }

        Ok(position)
    }

    async fn records_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<JournalRecord>> {
        let store = self.records.read().await;
        Ok(store
            .iter()
            .filter(|r| r.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }

    async fn query(&self, query: JournalQuery) -> Result<Vec<JournalRecord>> {
        let store = self.records.read().await;
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(store
            .iter()
            .filter(|r| query.matches(r))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn records_in_table(&self, table: &str) -> Result<Vec<JournalRecord>> {
        let store = self.records.read().await;
        Ok(store.iter().filter(|r| r.table == table).cloned().collect())
    }

    async fn stream_all(&self) -> Result<RecordStream> {
        use futures_util::stream;

        let records = self.records.read().await.clone();
        let stream = stream::iter(records.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn head(&self) -> Result<Position> {
        Ok(Position::new(self.records.read().await.len() as i64))
    }
}
