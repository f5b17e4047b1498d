pub mod error;
pub mod journal;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;

pub use common::AggregateId;
pub use error::{JournalError, Result};
pub use journal::{AppendOptions, Journal, RecordStream, validate_batch};
pub use memory::InMemoryJournal;
pub use postgres::PostgresJournal;
pub use query::JournalQuery;
pub use record::{JournalRecord, JournalRecordBuilder, Position, RecordId};
