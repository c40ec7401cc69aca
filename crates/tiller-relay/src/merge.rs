//! Row-union merging of per-worker tables.

use tiller_protocol::DataTable;

/// Concatenate partial tables into one, row-union.
///
/// Only columns present in every contribution survive; a column missing
/// from any partial cannot be row-merged and is dropped (the dispatcher
/// checks the requested columns afterwards and reports the loss). Rows are
/// appended in the order the partials are given, and relative row order
/// within each contribution is preserved.
pub fn merge_tables(name: &str, partials: Vec<DataTable>) -> DataTable {
    let mut iter = partials.into_iter();
    let Some(mut merged) = iter.next() else {
        return DataTable::new(name);
    };
    let rest: Vec<DataTable> = iter.collect();

    let shared: Vec<String> = merged
        .column_names()
        .filter(|column| rest.iter().all(|table| table.column(column).is_some()))
        .map(str::to_string)
        .collect();
    merged.retain_columns(&shared);

    for partial in &rest {
        merged.append_rows(partial);
    }

    merged.name = name.to_string();
    merged
}
