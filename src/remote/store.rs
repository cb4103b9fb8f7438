use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// One row, column name -> JSON value. Structured columns travel as
/// JSON values; backends may store them as text.
pub type Record = Map<String, JsonValue>;

/// Column-equals-value predicate; the only filter shape the sync layer
/// needs.
#[derive(Clone, Debug)]
pub struct Filter {
    pub column: String,
    pub value: JsonValue,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store is not reachable/initialized. `publish` turns
    /// this into the offline export fallback instead of failing.
    #[error("record store is not available")]
    Unavailable,
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{table}: {message}")]
    Row { table: String, message: String },
}

impl StoreError {
    pub fn row(table: &str, message: impl Into<String>) -> Self {
        StoreError::Row {
            table: table.to_string(),
            message: message.into(),
        }
    }
}

/// The relational store, reduced to generic row operations. The real
/// deployment fronts an HTTP record API; tests and offline hosts use
/// the bundled SQLite backend. All calls are synchronous; the embedding
/// host runs a single-threaded event loop.
pub trait RecordStore {
    fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Record>, StoreError>;
    fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError>;
    fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Record,
    ) -> Result<Record, StoreError>;
    fn upsert(
        &self,
        table: &str,
        records: Vec<Record>,
        conflict_columns: &[&str],
    ) -> Result<Vec<Record>, StoreError>;
    fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError>;
}
