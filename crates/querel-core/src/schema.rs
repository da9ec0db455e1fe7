//! Schema introspection capability.
//!
//! SQL generation and join-mapping resolution need three facts about a
//! table: its columns, its primary key, and its foreign key constraints.
//! [`SchemaInfo`] is that capability; [`StaticSchema`] is an in-memory
//! implementation fed from a snapshot (tests, or callers that introspect
//! once up front).
//!
//! Lookups are synchronous: the generator consumes a materialized
//! snapshot, never a live connection.

use std::collections::BTreeMap;

use crate::error::{Result, SchemaError, SchemaErrorKind};

/// A foreign key constraint, oriented from the table that declares it.
///
/// `columns` pairs each declaring-side column with the referenced column,
/// in constraint order. Order is significant: it defines the positional
/// correspondence join mappings and composite prefetch keys are built
/// from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    /// Constraint name, if the engine reports one.
    pub name: Option<String>,
    /// Table declaring the constraint.
    pub origin_table: String,
    /// Referenced table.
    pub destination_table: String,
    /// Ordered (declaring column, referenced column) pairs.
    pub columns: Vec<(String, String)>,
}

/// Per-table schema lookup.
pub trait SchemaInfo {
    /// Column names of a table, in declaration order.
    fn columns(&self, table: &str) -> Result<Vec<String>>;

    /// Primary key column names of a table.
    fn primary_key(&self, table: &str) -> Result<Vec<String>>;

    /// Foreign key constraints declared by a table.
    fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>>;
}

#[derive(Debug, Clone)]
struct TableEntry {
    columns: Vec<String>,
    primary_key: Vec<String>,
    foreign_keys: Vec<ForeignKeyInfo>,
}

/// In-memory [`SchemaInfo`] built from declared tables.
///
/// # Example
///
/// ```rust,ignore
/// let schema = StaticSchema::new()
///     .table("teams", &["id", "name"], &["id"])
///     .table("players", &["id", "team_id", "name"], &["id"])
///     .foreign_key("players", &[("team_id", "id")], "teams");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    tables: BTreeMap<String, TableEntry>,
}

impl StaticSchema {
    /// Create an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table with its columns and primary key.
    #[must_use]
    pub fn table(mut self, name: &str, columns: &[&str], primary_key: &[&str]) -> Self {
        self.tables.insert(
            name.to_string(),
            TableEntry {
                columns: columns.iter().map(|&c| c.to_string()).collect(),
                primary_key: primary_key.iter().map(|&c| c.to_string()).collect(),
                foreign_keys: Vec::new(),
            },
        );
        self
    }

    /// Declare a foreign key constraint on an already-declared table.
    ///
    /// `columns` pairs declaring-side columns with referenced columns, in
    /// constraint order.
    #[must_use]
    pub fn foreign_key(
        mut self,
        origin_table: &str,
        columns: &[(&str, &str)],
        destination_table: &str,
    ) -> Self {
        if let Some(entry) = self.tables.get_mut(origin_table) {
            entry.foreign_keys.push(ForeignKeyInfo {
                name: None,
                origin_table: origin_table.to_string(),
                destination_table: destination_table.to_string(),
                columns: columns
                    .iter()
                    .map(|&(a, b)| (a.to_string(), b.to_string()))
                    .collect(),
            });
        }
        self
    }

    fn entry(&self, table: &str) -> Result<&TableEntry> {
        self.tables.get(table).ok_or_else(|| {
            SchemaError::new(
                SchemaErrorKind::UnknownTable,
                table,
                "table is not declared in the schema",
            )
            .into()
        })
    }
}

impl SchemaInfo for StaticSchema {
    fn columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.entry(table)?.columns.clone())
    }

    fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let entry = self.entry(table)?;
        if entry.primary_key.is_empty() {
            return Err(SchemaError::new(
                SchemaErrorKind::MissingPrimaryKey,
                table,
                "table has no primary key",
            )
            .into());
        }
        Ok(entry.primary_key.clone())
    }

    fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        Ok(self.entry(table)?.foreign_keys.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn schema() -> StaticSchema {
        StaticSchema::new()
            .table("teams", &["id", "name"], &["id"])
            .table("players", &["id", "team_id", "name"], &["id"])
            .table("notes", &["body"], &[])
            .foreign_key("players", &[("team_id", "id")], "teams")
    }

    #[test]
    fn lookups_resolve_declared_tables() {
        let s = schema();
        assert_eq!(s.primary_key("teams").unwrap(), vec!["id"]);
        assert_eq!(
            s.columns("players").unwrap(),
            vec!["id", "team_id", "name"]
        );
        let fks = s.foreign_keys("players").unwrap();
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].destination_table, "teams");
        assert_eq!(fks[0].columns, vec![("team_id".to_string(), "id".to_string())]);
    }

    #[test]
    fn unknown_table_is_a_schema_error() {
        let err = schema().columns("nope").unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError {
                kind: SchemaErrorKind::UnknownTable,
                ..
            })
        ));
    }

    #[test]
    fn missing_primary_key_is_reported() {
        let err = schema().primary_key("notes").unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError {
                kind: SchemaErrorKind::MissingPrimaryKey,
                ..
            })
        ));
    }
}
