use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use common::{AggregateId, BranchId, StationId, UserId};
use journal::{AppendOptions, Journal, JournalRecord};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::clock::Clock;
use crate::error::{DomainError, Result};
use crate::events::{CoreEvent, EventBus};
use crate::history::{HistoryChange, HistoryEntry, HistorySubject};

use super::{IdentifierKind, Tables};

/// Who is acting, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionContext {
    pub user: UserId,
    pub branch: BranchId,
    pub station: Option<StationId>,
}

impl SessionContext {
    pub fn new(user: UserId, branch: BranchId) -> Self {
        Self {
            user,
            branch,
            station: None,
        }
    }

    pub fn at_station(mut self, station: StationId) -> Self {
        self.station = Some(station);
        self
    }
}

/// The store. One transaction holds it at a time.
#[derive(Clone)]
pub struct Database {
    tables: Arc<Mutex<Tables>>,
    journal: Arc<dyn Journal>,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
}

impl Database {
    pub fn new(journal: Arc<dyn Journal>, clock: Arc<dyn Clock>, bus: EventBus) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            journal,
            clock,
            bus: Arc::new(bus),
        }
    }

    pub fn journal(&self) -> &Arc<dyn Journal> {
        &self.journal
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Opens a transaction, waiting for the one in flight to finish.
    ///
    /// The transaction time is read once here.
    pub async fn begin(&self, context: SessionContext) -> Transaction {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        tracing::trace!(user = %context.user, branch = %context.branch, "transaction started");
        Transaction {
            guard,
            working,
            context,
            now: self.clock.now(),
            batch: Vec::new(),
            journal: Arc::clone(&self.journal),
            bus: Arc::clone(&self.bus),
            poisoned: false,
            finished: false,
        }
    }
}

/// A serializable unit of work over a private copy of the tables.
///
/// Nothing is visible to other transactions until [`Transaction::commit`]
/// succeeds. Dropping the transaction discards every change.
pub struct Transaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    context: SessionContext,
    now: DateTime<Utc>,
    batch: Vec<JournalRecord>,
    journal: Arc<dyn Journal>,
    bus: Arc<EventBus>,
    poisoned: bool,
    finished: bool,
}

impl Transaction {
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn actor(&self) -> UserId {
        self.context.user
    }

    pub fn branch(&self) -> BranchId {
        self.context.branch
    }

    pub fn station(&self) -> Result<StationId> {
        self.context
            .station
            .ok_or_else(|| DomainError::InvalidValue("no station in session".to_string()))
    }

    /// Transaction time.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// True once an operation in this transaction has failed.
    pub fn is_aborted(&self) -> bool {
        self.poisoned
    }

    pub(crate) fn tables(&self) -> &Tables {
        &self.working
    }

    pub(crate) fn tables_mut(&mut self) -> &mut Tables {
        &mut self.working
    }

    /// Runs one operation. A failure marks the whole transaction aborted.
    pub fn run<T>(&mut self, operation: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.poisoned {
            return Err(DomainError::TransactionAborted);
        }
        let result = operation(self);
        if let Err(ref error) = result {
            tracing::debug!(%error, "operation failed, transaction aborted");
            self.poisoned = true;
        }
        result
    }

    pub(crate) fn next_identifier(&mut self, kind: IdentifierKind) -> i64 {
        let branch = self.context.branch;
        self.working.next_identifier(kind, branch)
    }

    /// Queues an append-only row for the journal.
    pub(crate) fn record<T: Serialize>(
        &mut self,
        table: &str,
        aggregate_type: &str,
        aggregate_id: AggregateId,
        payload: &T,
    ) -> Result<()> {
        let record = JournalRecord::builder()
            .table(table)
            .aggregate_type(aggregate_type)
            .aggregate_id(aggregate_id)
            .recorded_at(self.now)
            .payload(payload)?
            .metadata("actor", serde_json::json!(self.context.user))
            .metadata("branch", serde_json::json!(self.context.branch))
            .metadata("station", serde_json::json!(self.context.station))
            .build()?;
        self.batch.push(record);
        Ok(())
    }

    /// Appends a history row stamped with the actor and transaction time.
    pub(crate) fn write_history(
        &mut self,
        subject: HistorySubject,
        change: HistoryChange,
    ) -> Result<()> {
        let entry = HistoryEntry::from_change(subject, change, self.context.user, self.now);
        let subject = entry.subject;
        self.record(
            subject.table(),
            subject.aggregate_type(),
            subject.aggregate_id(),
            &entry,
        )?;
        self.working.history.push(entry);
        Ok(())
    }

    /// History rows of one document, oldest first.
    pub fn history(&self, subject: HistorySubject) -> Vec<HistoryEntry> {
        self.working
            .history
            .iter()
            .filter(|h| h.subject == subject)
            .cloned()
            .collect()
    }

    /// Dispatches an event to every subscriber inside this transaction.
    pub fn publish(&mut self, event: CoreEvent) -> Result<()> {
        let bus = Arc::clone(&self.bus);
        bus.publish(self, &event)
    }

    /// Number of journal rows this transaction will write on commit.
    pub fn pending_records(&self) -> usize {
        self.batch.len()
    }

    /// Writes the journal batch, then makes the changes visible.
    ///
    /// The append expects the journal head this store last saw, so a second
    /// writer on the same journal makes the commit fail. On any failure the
    /// transaction is rolled back.
    pub async fn commit(mut self) -> Result<()> {
        if self.poisoned {
            return Err(DomainError::TransactionAborted);
        }

        let started = Instant::now();
        let batch = std::mem::take(&mut self.batch);
        let count = batch.len();
        if !batch.is_empty() {
            let expected = match self.working.journal_head {
                Some(head) => head,
                None => self.journal.head().await?,
            };
            let head = self
                .journal
                .append(batch, AppendOptions::expect_head(expected))
                .await?;
            self.working.journal_head = Some(head);
        }

        *self.guard = std::mem::take(&mut self.working);
        self.finished = true;

        metrics::counter!("transactions_committed_total").increment(1);
        metrics::histogram!("transaction_commit_seconds").record(started.elapsed().as_secs_f64());
        tracing::debug!(records = count, "transaction committed");
        Ok(())
    }

    /// Discards every change.
    pub fn rollback(self) {
        drop(self);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            metrics::counter!("transactions_aborted_total").increment(1);
            tracing::debug!(aborted = self.poisoned, "transaction rolled back");
        }
    }
}
