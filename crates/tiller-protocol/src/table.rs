//! Column-ordered tabular results.

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

use crate::value::Value;

/// A named table with insertion-ordered columns.
///
/// Every column holds one value per row. Column order matters: it is the
/// order columns were requested in, and it survives serialization and
/// merging. Row order within a table is likewise preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    /// Table name.
    pub name: String,
    columns: IndexMap<String, Vec<Value>>,
}

impl DataTable {
    /// Create an empty table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
        }
    }

    /// Append a column. Replaces any existing column with the same name.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) {
        self.columns.insert(name.into(), values);
    }

    /// Builder-style [`push_column`](Self::push_column).
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.push_column(name, values);
        self
    }

    /// The values of a column, if it exists.
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows, taken from the longest column.
    pub fn row_count(&self) -> usize {
        self.columns.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Whether the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Append another table's rows, column by column.
    ///
    /// Only columns present in `self` are extended; the caller decides which
    /// columns survive a merge before calling this. Relative row order of
    /// both contributions is preserved.
    pub fn append_rows(&mut self, other: &DataTable) {
        for (name, values) in &mut self.columns {
            if let Some(incoming) = other.columns.get(name) {
                values.extend(incoming.iter().cloned());
            }
        }
    }

    /// Keep only the named columns, in the order given, dropping the rest.
    pub fn retain_columns(&mut self, names: &[String]) {
        let mut kept = IndexMap::new();
        for name in names {
            if let Some(values) = self.columns.shift_remove(name) {
                kept.insert(name.clone(), values);
            }
        }
        self.columns = kept;
    }
}
