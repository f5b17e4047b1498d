use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, JournalError, Result};

/// Unique identifier for a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
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

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Global position of a record in the journal.
///
/// Positions start at 1 for the first record ever appended and grow by one
/// per record. Position 0 is the head of an empty journal and marks records
/// that have not been appended yet.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(i64);

impl Position {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Head of an empty journal.
    pub fn start() -> Self {
        Self(0)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Position {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// One append-only row: a till entry, a stock transaction or a history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub record_id: RecordId,

    /// Assigned by the journal on append.
    pub position: Position,

    /// Logical table the row belongs to (e.g. "till_entry", "work_order_history").
    pub table: String,

    /// Kind of the entity the row refers to (e.g. "Till", "WorkOrder").
    pub aggregate_type: String,

    /// The entity the row refers to.
    pub aggregate_id: AggregateId,

    /// Transaction time of the operation that produced the row.
    pub recorded_at: DateTime<Utc>,

    pub payload: serde_json::Value,

    /// Actor, branch and station of the producing transaction.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl JournalRecord {
    pub fn builder() -> JournalRecordBuilder {
        JournalRecordBuilder::default()
    }
}

/// Builder for journal records.
#[derive(Debug, Default)]
pub struct JournalRecordBuilder {
    record_id: Option<RecordId>,
    table: Option<String>,
    aggregate_type: Option<String>,
    aggregate_id: Option<AggregateId>,
    recorded_at: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl JournalRecordBuilder {
    pub fn record_id(mut self, id: RecordId) -> Self {
        self.record_id = Some(id);
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn aggregate_id(mut self, id: impl Into<AggregateId>) -> Self {
        self.aggregate_id = Some(id.into());
        self
    }

    pub fn recorded_at(mut self, at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(at);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builds the record. Fails when table, aggregate or payload are missing.
    pub fn build(self) -> Result<JournalRecord> {
        let missing = |field: &str| JournalError::InvalidBatch(format!("{field} is required"));
        Ok(JournalRecord {
            record_id: self.record_id.unwrap_or_default(),
            position: Position::start(),
            table: self.table.ok_or_else(|| missing("table"))?,
            aggregate_type: self
                .aggregate_type
                .ok_or_else(|| missing("aggregate_type"))?,
            aggregate_id: self.aggregate_id.ok_or_else(|| missing("aggregate_id"))?,
            recorded_at: self.recorded_at.unwrap_or_else(Utc::now),
            payload: self.payload.ok_or_else(|| missing("payload"))?,
            metadata: self.metadata,
        })
    }
}
