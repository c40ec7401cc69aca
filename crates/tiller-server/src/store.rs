//! Seam to the tabular result store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use snafu::Snafu;
use tiller_protocol::DataTable;

/// Errors raised by the result store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The requested table does not exist.
    #[snafu(display("table {table} does not exist in the data store"))]
    TableNotFound {
        /// Missing table.
        table: String,
    },

    /// The table exists but could not be read.
    #[snafu(display("unable to read table {table} from the data store: {reason}"))]
    ReadFailed {
        /// Table that failed to read.
        table: String,
        /// What went wrong.
        reason: String,
    },
}

/// The tabular result store written by simulation runs.
///
/// `read` returns the named table restricted to the requested columns, in
/// request order. Columns that do not exist are simply absent from the
/// result; the executor enforces the every-column-present contract after
/// the read.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Read `columns` from `table`.
    async fn read(&self, table: &str, columns: &[String]) -> Result<DataTable, StoreError>;
}

/// In-memory store, used by tests and embedding callers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, DataTable>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a table.
    pub fn insert(&self, table: DataTable) {
        let mut tables = match self.tables.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tables.insert(table.name.clone(), table);
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn read(&self, table: &str, columns: &[String]) -> Result<DataTable, StoreError> {
        let tables = match self.tables.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut found = tables
            .get(table)
            .cloned()
            .ok_or_else(|| StoreError::TableNotFound {
                table: table.to_string(),
            })?;
        found.retain_columns(columns);
        Ok(found)
    }
}
