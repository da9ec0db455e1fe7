//! Row abstraction returned by statement execution.
//!
//! Rows give positional and named access to their column values. All rows
//! of one fetch share a single [`ColumnInfo`] via `Arc`, which is what
//! makes the prefetch engine's resolve-indices-once grouping sound: the
//! column layout of the first row is the layout of every row.
//!
//! Each row also carries its prefetched row store: child rows attached
//! under an association key-path by the prefetch engine, read back by the
//! decoding layer.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result, TypeError};
use crate::value::{FromValue, Value};

/// Column layout shared by every row of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    names: Vec<String>,
}

impl ColumnInfo {
    /// Create column info from column names, in result order.
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether there are no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of the column with the given name, if present.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Name of the column at the given index.
    #[must_use]
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// All column names in result order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<ColumnInfo>,
    values: Vec<Value>,
    /// Prefetched child rows keyed by association key-path.
    prefetched: BTreeMap<String, Vec<Row>>,
}

impl Row {
    /// Create a row from column names and values.
    ///
    /// Column count and value count must match; this is the statement
    /// executor's contract.
    #[must_use]
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            columns: Arc::new(ColumnInfo::new(column_names)),
            values,
            prefetched: BTreeMap::new(),
        }
    }

    /// Create a row sharing an existing column layout.
    #[must_use]
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self {
            columns,
            values,
            prefetched: BTreeMap::new(),
        }
    }

    /// Shared column layout.
    #[must_use]
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at the given index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of the named column.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Decode the value at the given index.
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.values.get(index).ok_or_else(|| {
            Error::Type(TypeError {
                expected: "column in range",
                actual: format!("index {index} of {} columns", self.values.len()),
                column: None,
            })
        })?;
        T::from_value(value)
    }

    /// Decode the value of the named column.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let index = self.columns.index_of(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: "known column",
                actual: format!("no column named {name}"),
                column: Some(name.to_string()),
            })
        })?;
        T::from_value(&self.values[index]).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            other => other,
        })
    }

    /// Iterate column names in result order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names.iter().map(String::as_str)
    }

    /// Iterate values in result order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Attach prefetched child rows under an association key-path.
    ///
    /// Written only by the prefetch engine; each association writes its
    /// key-path exactly once per fetch.
    pub fn set_prefetched(&mut self, key_path: impl Into<String>, rows: Vec<Row>) {
        self.prefetched.insert(key_path.into(), rows);
    }

    /// Prefetched child rows for an association key-path.
    ///
    /// `None` means the association was never prefetched; an empty slice
    /// means it was prefetched and matched no child rows.
    #[must_use]
    pub fn prefetched(&self, key_path: &str) -> Option<&[Row]> {
        self.prefetched.get(key_path).map(Vec::as_slice)
    }

    /// All prefetched key-paths and their row groups.
    #[must_use]
    pub fn prefetched_rows(&self) -> &BTreeMap<String, Vec<Row>> {
        &self.prefetched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Row {
        Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![Value::BigInt(1), Value::Text("a".into())],
        )
    }

    #[test]
    fn positional_and_named_access_agree() {
        let row = sample();
        assert_eq!(row.get(0), Some(&Value::BigInt(1)));
        assert_eq!(row.get_by_name("name"), Some(&Value::Text("a".into())));
        assert_eq!(row.get_named::<i64>("id").unwrap(), 1);
        assert_eq!(row.get_as::<String>(1).unwrap(), "a");
    }

    #[test]
    fn missing_column_is_a_type_error() {
        let row = sample();
        assert!(row.get_named::<i64>("nope").is_err());
        assert!(row.get_as::<i64>(5).is_err());
    }

    #[test]
    fn rows_share_column_info() {
        let row = sample();
        let info = row.column_info();
        let other = Row::with_columns(info.clone(), vec![Value::BigInt(2), Value::Null]);
        assert!(Arc::ptr_eq(&info, &other.column_info()));
    }

    #[test]
    fn prefetched_store_distinguishes_empty_from_absent() {
        let mut row = sample();
        assert!(row.prefetched("children").is_none());
        row.set_prefetched("children", Vec::new());
        assert_eq!(row.prefetched("children"), Some(&[] as &[Row]));
    }
}
