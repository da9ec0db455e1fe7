//! Read-region computation.
//!
//! A region names the tables, and where determinable the columns, a
//! relation will read when fetched. Regions are computed from the same
//! structures the live path executes: prefetched associations contribute
//! the region of the very follow-up relation the prefetch engine would
//! build, key-strategy CTE included, so region computation and execution
//! cannot drift apart.
//!
//! Regions are driven by selections and join targets. Predicate columns
//! are not tracked separately: a table a predicate touches is always
//! also a selection or join target of the same relation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use querel_core::{Result, SchemaInfo};

use crate::association::JoinCondition;
use crate::expr::Expr;
use crate::prefetch::{build_prefetch_request, plan_key_strategy, KeyStrategy, KEYS_CTE};
use crate::relation::{Relation, SelectionItem, Source};

/// Columns of one table a fetch reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRegion {
    /// Every column.
    Full,
    /// A known subset of columns.
    Columns(BTreeSet<String>),
}

impl TableRegion {
    /// Widen this region to also cover `other`.
    pub fn merge(&mut self, other: &TableRegion) {
        match (&mut *self, other) {
            (TableRegion::Full, _) => {}
            (_, TableRegion::Full) => *self = TableRegion::Full,
            (TableRegion::Columns(mine), TableRegion::Columns(theirs)) => {
                mine.extend(theirs.iter().cloned());
            }
        }
    }
}

/// The tables and columns a fetch reads, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseRegion {
    tables: BTreeMap<String, TableRegion>,
}

impl DatabaseRegion {
    /// Empty region.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every column of a table as read.
    pub fn add_full(&mut self, table: impl Into<String>) {
        self.tables.insert(table.into(), TableRegion::Full);
    }

    /// Mark one column of a table as read.
    pub fn add_column(&mut self, table: impl Into<String>, column: impl Into<String>) {
        let entry = self
            .tables
            .entry(table.into())
            .or_insert_with(|| TableRegion::Columns(BTreeSet::new()));
        if let TableRegion::Columns(columns) = entry {
            columns.insert(column.into());
        }
    }

    /// Widen this region to also cover `other`.
    pub fn union(&mut self, other: &DatabaseRegion) {
        for (table, region) in &other.tables {
            match self.tables.get_mut(table) {
                Some(existing) => existing.merge(region),
                None => {
                    self.tables.insert(table.clone(), region.clone());
                }
            }
        }
    }

    /// Region of a single table, if it is read at all.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableRegion> {
        self.tables.get(name)
    }

    /// All table regions, ordered by table name.
    #[must_use]
    pub fn tables(&self) -> &BTreeMap<String, TableRegion> {
        &self.tables
    }

    /// Whether nothing is read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl fmt::Display for DatabaseRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (table, region) in &self.tables {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            match region {
                TableRegion::Full => write!(f, "{table}(*)")?,
                TableRegion::Columns(columns) => {
                    write!(f, "{table}(")?;
                    for (i, column) in columns.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{column}")?;
                    }
                    write!(f, ")")?;
                }
            }
        }
        Ok(())
    }
}

impl Relation {
    /// Compute the region this relation reads when fetched, prefetched
    /// associations included.
    pub fn region<S>(&self, schema: &S) -> Result<DatabaseRegion>
    where
        S: SchemaInfo + ?Sized,
    {
        let mut region = DatabaseRegion::new();
        self.collect_region(schema, &mut region)?;
        Ok(region)
    }

    fn collect_region<S>(&self, schema: &S, region: &mut DatabaseRegion) -> Result<()>
    where
        S: SchemaInfo + ?Sized,
    {
        match &self.source {
            Source::Table(table) => {
                if self.selection.is_empty() {
                    region.add_full(table.clone());
                } else {
                    for item in &self.selection {
                        collect_selection_item(item, table, region);
                    }
                }
            }
            Source::Subquery(inner) => inner.collect_region(schema, region)?,
        }

        // A join reads its target wholesale as far as the region is
        // concerned, whether or not its columns merge into the selection.
        for join in self.sql_joins() {
            for hop in join.association.hops() {
                region.add_full(hop.relation.table_name()?.to_string());
            }
        }

        for cte in self.ctes.entries() {
            cte.relation.collect_region(schema, region)?;
        }

        for association in self.prefetch_associations() {
            let JoinCondition::ForeignKey { hint } = &association.pivot().condition else {
                // The live path rejects expression pivots before querying.
                return Err(querel_core::Error::Invariant(format!(
                    "association '{}' joins through an explicit expression and cannot be prefetched",
                    association.key()
                )));
            };
            let origin_table = self.table_name()?;
            let pivot_table = association.pivot().relation.table_name()?.to_string();
            let mapping = crate::association::resolve_join_mapping(
                schema,
                origin_table,
                &pivot_table,
                hint.as_deref(),
            )?;
            let request = build_prefetch_request(association, &mapping)?;
            let request = match plan_key_strategy(self, &mapping)? {
                // The IN list carries data values, not schema; the key
                // column itself is already part of the request selection.
                KeyStrategy::SingleColumn { .. } => request,
                KeyStrategy::CompositeCte { keys, .. } => request.with_cte(KEYS_CTE, keys),
            };
            request.collect_region(schema, region)?;
        }

        Ok(())
    }
}

fn collect_selection_item(item: &SelectionItem, source_table: &str, region: &mut DatabaseRegion) {
    match item {
        SelectionItem::TableStar(table) => region.add_full(table.clone()),
        SelectionItem::Expr(expr) | SelectionItem::Aliased { expr, .. } => {
            collect_expr(expr, source_table, region);
        }
    }
}

fn collect_expr(expr: &Expr, source_table: &str, region: &mut DatabaseRegion) {
    match expr {
        Expr::Column { table, name } => {
            let table = table.as_deref().unwrap_or(source_table);
            region.add_column(table.to_string(), name.clone());
        }
        // Anything beyond a plain column reference is conservatively a
        // full read of the source table.
        _ => region.add_full(source_table.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::Association;
    use querel_core::StaticSchema;

    fn schema() -> StaticSchema {
        StaticSchema::new()
            .table("teams", &["id", "name"], &["id"])
            .table("players", &["id", "team_id", "name"], &["id"])
            .table(
                "passports",
                &["country", "number", "owner"],
                &["country", "number"],
            )
            .table(
                "stamps",
                &["id", "passport_country", "passport_number"],
                &["id"],
            )
            .foreign_key("players", &[("team_id", "id")], "teams")
            .foreign_key(
                "stamps",
                &[
                    ("passport_country", "country"),
                    ("passport_number", "number"),
                ],
                "passports",
            )
    }

    fn columns(names: &[&str]) -> TableRegion {
        TableRegion::Columns(names.iter().map(|&n| n.to_string()).collect())
    }

    #[test]
    fn bare_relation_reads_the_whole_table() {
        let region = Relation::table("teams").region(&schema()).unwrap();
        assert_eq!(region.table("teams"), Some(&TableRegion::Full));
        assert_eq!(region.tables().len(), 1);
    }

    #[test]
    fn column_selection_narrows_the_region() {
        let region = Relation::table("teams")
            .select_columns(&["id", "name"])
            .region(&schema())
            .unwrap();
        assert_eq!(region.table("teams"), Some(&columns(&["id", "name"])));
    }

    #[test]
    fn joins_read_their_targets_wholesale() {
        let region = Relation::table("teams")
            .select_columns(&["id"])
            .joining_required(Association::has_many("players", "players"))
            .region(&schema())
            .unwrap();
        assert_eq!(region.table("teams"), Some(&columns(&["id"])));
        assert_eq!(region.table("players"), Some(&TableRegion::Full));
    }

    #[test]
    fn full_absorbs_columns_under_union() {
        let mut a = DatabaseRegion::new();
        a.add_column("teams", "id");
        let mut b = DatabaseRegion::new();
        b.add_full("teams");
        a.union(&b);
        assert_eq!(a.table("teams"), Some(&TableRegion::Full));
    }

    #[test]
    fn single_key_prefetch_reads_origin_and_destination() {
        let region = Relation::table("teams")
            .include_all(Association::has_many("players", "players"))
            .region(&schema())
            .unwrap();
        assert_eq!(region.table("teams"), Some(&TableRegion::Full));
        // Destination star plus the aliased pivot key column.
        assert_eq!(region.table("players"), Some(&TableRegion::Full));
    }

    #[test]
    fn composite_key_prefetch_includes_the_keys_cte_region() {
        let region = Relation::table("passports")
            .select_columns(&["owner"])
            .include_all(Association::has_many("stamps", "stamps"))
            .region(&schema())
            .unwrap();
        // The reduced origin in the keys CTE reads the key columns even
        // though the outer selection does not.
        assert_eq!(
            region.table("passports"),
            Some(&columns(&["owner", "country", "number"]))
        );
        assert_eq!(region.table("stamps"), Some(&TableRegion::Full));
    }

    #[test]
    fn display_lists_tables_alphabetically() {
        let mut region = DatabaseRegion::new();
        region.add_full("teams");
        region.add_column("players", "id");
        region.add_column("players", "name");
        assert_eq!(region.to_string(), "players(id, name), teams(*)");
    }
}
