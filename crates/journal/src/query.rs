use chrono::{DateTime, Utc};

use crate::{AggregateId, Position};

/// Filter over journal records.
#[derive(Debug, Clone, Default)]
pub struct JournalQuery {
    pub table: Option<String>,
    pub aggregate_type: Option<String>,
    pub aggregate_id: Option<AggregateId>,

    /// Minimum position (inclusive).
    pub from_position: Option<Position>,

    /// Maximum position (inclusive).
    pub to_position: Option<Position>,

    pub from_timestamp: Option<DateTime<Utc>>,
    pub to_timestamp: Option<DateTime<Utc>>,

    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl JournalQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of one logical table.
    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Default::default()
        }
    }

    /// Records referring to one entity.
    pub fn for_aggregate(aggregate_id: impl Into<AggregateId>) -> Self {
        Self {
            aggregate_id: Some(aggregate_id.into()),
            ..Default::default()
        }
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

    pub fn from_position(mut self, position: Position) -> Self {
        self.from_position = Some(position);
        self
    }

    pub fn to_position(mut self, position: Position) -> Self {
        self.to_position = Some(position);
        self
    }

    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the record passes every filter except limit/offset.
    pub fn matches(&self, record: &crate::JournalRecord) -> bool {
        if let Some(ref table) = self.table
            && &record.table != table
        {
            return false;
        }
        if let Some(ref agg_type) = self.aggregate_type
            && &record.aggregate_type != agg_type
        {
            return false;
        }
        if let Some(id) = self.aggregate_id
            && record.aggregate_id != id
        {
            return false;
        }
        if let Some(from) = self.from_position
            && record.position < from
        {
            return false;
        }
        if let Some(to) = self.to_position
            && record.position > to
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && record.recorded_at < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && record.recorded_at > to
        {
            return false;
        }
        true
    }
}
