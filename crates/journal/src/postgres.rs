use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{
    PgPool, Row,
    postgres::{PgPoolOptions, PgRow},
};
use uuid::Uuid;

use crate::{
    AggregateId, JournalError, JournalQuery, JournalRecord, Position, RecordId, Result,
    journal::{AppendOptions, Journal, RecordStream, validate_batch},
};

const SELECT_COLUMNS: &str =
    "SELECT position, id, table_name, aggregate_type, aggregate_id, recorded_at, payload, metadata FROM journal";

/// PostgreSQL-backed journal.
#[derive(Clone)]
pub struct PostgresJournal {
    pool: PgPool,
}

impl PostgresJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a small pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        tracing::info!("journal connected to postgres");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<JournalRecord> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(JournalRecord {
            record_id: RecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            position: Position::new(row.try_get("position")?),
            table: row.try_get("table_name")?,
            aggregate_type: row.try_get("aggregate_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            recorded_at: row.try_get("recorded_at")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }
}

#[async_trait]
impl Journal for PostgresJournal {
    async fn append(
        &self,
        records: Vec<JournalRecord>,
        options: AppendOptions,
    ) -> Result<Position> {
        validate_batch(&records)?;

        let mut tx = self.pool.begin().await?;

        // Serializes writers so positions are gap-free and the head check holds.
        sqlx::query("LOCK TABLE journal IN EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(position), 0) FROM journal")
            .fetch_one(&mut *tx)
            .await?;
        let head = Position::new(current);

        if let Some(expected) = options.expected_head
            && head != expected
        {
            return Err(JournalError::ConcurrencyConflict {
                expected,
                actual: head,
            });
        }

        let mut position = head;
        for record in &records {
            position = position.next();
            let metadata_json = serde_json::to_value(&record.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO journal (position, id, table_name, aggregate_type, aggregate_id, recorded_at, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(position.as_i64())
            .bind(record.record_id.as_uuid())
            .bind(&record.table)
            .bind(&record.aggregate_type)
            .bind(record.aggregate_id.as_uuid())
            .bind(record.recorded_at)
            .bind(&record.payload)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(head = %position, count = records.len(), "journal batch appended");
        metrics::counter!("journal_records_appended_total").increment(records.len() as u64);
        Ok(position)
    }

    async fn records_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<JournalRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE aggregate_id = $1 ORDER BY position ASC"
        ))
        .bind(aggregate_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn query(&self, query: JournalQuery) -> Result<Vec<JournalRecord>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE 1=1");
        let mut param_count = 0;

        if query.table.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND table_name = ${param_count}"));
        }
        if query.aggregate_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_type = ${param_count}"));
        }
        if query.aggregate_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_id = ${param_count}"));
        }
        if query.from_position.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND position >= ${param_count}"));
        }
        if query.to_position.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND position <= ${param_count}"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND recorded_at >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND recorded_at <= ${param_count}"));
        }

        sql.push_str(" ORDER BY position ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(table) = query.table {
            sqlx_query = sqlx_query.bind(table);
        }
        if let Some(agg_type) = query.aggregate_type {
            sqlx_query = sqlx_query.bind(agg_type);
        }
        if let Some(id) = query.aggregate_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(from) = query.from_position {
            sqlx_query = sqlx_query.bind(from.as_i64());
        }
        if let Some(to) = query.to_position {
            sqlx_query = sqlx_query.bind(to.as_i64());
        }
        if let Some(from_ts) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from_ts);
        }
        if let Some(to_ts) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to_ts);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn records_in_table(&self, table: &str) -> Result<Vec<JournalRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE table_name = $1 ORDER BY position ASC"
        ))
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn stream_all(&self) -> Result<RecordStream> {
        use futures_util::stream;

        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY position ASC"))
            .fetch_all(&self.pool)
            .await?;

        let stream = stream::iter(rows.into_iter().map(Self::row_to_record));
        Ok(Box::pin(stream))
    }

    async fn head(&self) -> Result<Position> {
        let head: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(position), 0) FROM journal")
            .fetch_one(&self.pool)
            .await?;
        Ok(Position::new(head))
    }
}
