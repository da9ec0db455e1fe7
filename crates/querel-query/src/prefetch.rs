//! Association prefetching.
//!
//! After a relation's main fetch, each association registered with
//! `include_all` loads its rows in exactly one follow-up query, whatever
//! the parent count. The follow-up selects the destination's columns plus
//! the pivot-side key columns aliased under the `querel_` prefix, groups
//! the returned rows in memory by key tuple, and attaches each group to
//! its parent row under the association key-path.
//!
//! Two key strategies exist, chosen by key arity:
//!
//! - single-column keys filter the pivot column with an `IN` list of the
//!   distinct parent key values;
//! - composite keys attach the reduced origin relation as a
//!   `querel_keys` CTE and filter with row-value membership, because an
//!   `IN` list cannot express multi-column tuples portably.
//!
//! Grouping resolves column indices once, against the first returned
//! row; all rows of one fetch share that layout.

use std::collections::{HashMap, HashSet};

use async_recursion::async_recursion;
use asupersync::{Cx, Outcome};
use querel_core::{Connection, Error, Result, Row, SchemaInfo, Value};

use crate::association::{resolve_join_mapping, Association, Hop, JoinCondition, JoinMapping};
use crate::expr::Expr;
use crate::relation::{JoinKind, Relation, SelectionItem};

/// Alias prefix for pivot-side key columns in prefetch selections.
pub(crate) const PREFETCH_PREFIX: &str = "querel_";

/// CTE name carrying the reduced origin relation for composite keys.
pub(crate) const KEYS_CTE: &str = "querel_keys";

/// How parent rows constrain the follow-up query.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum KeyStrategy {
    /// One key column: filter with `pivot.right IN (v1, ..., vn)`.
    SingleColumn { left: String, right: String },
    /// Composite key: attach the reduced origin as a CTE and filter with
    /// `(pivot.r1, ..., pivot.rk) IN querel_keys`.
    CompositeCte {
        lefts: Vec<String>,
        rights: Vec<String>,
        keys: Relation,
    },
}

/// Plan the key strategy for prefetching `mapping` out of `origin`.
///
/// The composite-key CTE is the origin relation reduced to its key
/// columns: ordering is stripped unless a limit depends on it, and
/// prefetch registrations are dropped since they never affect which rows
/// the origin matches.
pub(crate) fn plan_key_strategy(origin: &Relation, mapping: &JoinMapping) -> Result<KeyStrategy> {
    let lefts = mapping.left_columns();
    let rights = mapping.right_columns();
    if mapping.len() == 1 {
        let mut lefts = lefts;
        let mut rights = rights;
        return Ok(KeyStrategy::SingleColumn {
            left: lefts.remove(0),
            right: rights.remove(0),
        });
    }

    let table = origin.table_name()?.to_string();
    let mut keys = origin.clone();
    keys.selection = lefts
        .iter()
        .map(|c| SelectionItem::Expr(Expr::qualified(&table, c)))
        .collect();
    if keys.limit.is_none() {
        keys.ordering.clear();
    }
    keys.joins.retain(|j| j.kind != JoinKind::All);
    // Kept joins still constrain which origin rows match, but their
    // columns must stay out of the CTE: the row-value membership test
    // pairs positionally against exactly the key columns.
    for join in &mut keys.joins {
        join.merges_selection = false;
    }
    Ok(KeyStrategy::CompositeCte {
        lefts,
        rights,
        keys,
    })
}

/// Build the follow-up relation for one association, before the key
/// filter is applied: destination columns plus aliased pivot-side key
/// columns, joined back through intermediate hops for through-chains.
pub(crate) fn build_prefetch_request(
    association: &Association,
    mapping: &JoinMapping,
) -> Result<Relation> {
    let hops = association.hops();
    let pivot_table = hops[0].relation.table_name()?.to_string();
    let destination = association.destination();
    let dest_table = destination.table_name()?.to_string();

    let mut request = destination.clone();

    if hops.len() > 1 {
        // Walk from the destination back toward the pivot; each hop's
        // condition relates it to the hop before it.
        let mut back = Vec::new();
        for i in (1..hops.len()).rev() {
            back.push(Hop {
                relation: hops[i - 1].relation.clone(),
                condition: hops[i].condition.clone(),
            });
        }
        request = request.joining_required(Association::from_hops("querel_chain", back));
    }

    let mut selection = if request.selection.is_empty() {
        vec![SelectionItem::TableStar(dest_table)]
    } else {
        std::mem::take(&mut request.selection)
    };
    for right in mapping.right_columns() {
        selection.push(SelectionItem::Aliased {
            expr: Expr::qualified(&pivot_table, &right),
            alias: format!("{PREFETCH_PREFIX}{right}"),
        });
    }
    Ok(request.select(selection))
}

/// Run every registered prefetch of `relation` against `rows`, one query
/// per association, recursing into nested registrations.
#[async_recursion]
pub(crate) async fn prefetch<C, S>(
    cx: &Cx,
    conn: &C,
    schema: &S,
    relation: &Relation,
    rows: &mut [Row],
) -> Outcome<(), Error>
where
    C: Connection,
    S: SchemaInfo + Sync,
{
    if rows.is_empty() {
        return Outcome::Ok(());
    }
    for association in relation.prefetch_associations() {
        match prefetch_one(cx, conn, schema, relation, association, rows).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    }
    Outcome::Ok(())
}

#[tracing::instrument(skip_all, fields(association = association.key()))]
async fn prefetch_one<C, S>(
    cx: &Cx,
    conn: &C,
    schema: &S,
    origin: &Relation,
    association: &Association,
    rows: &mut [Row],
) -> Outcome<(), Error>
where
    C: Connection,
    S: SchemaInfo + Sync,
{
    let prepared = match prepare(schema, origin, association, rows) {
        Ok(prepared) => prepared,
        Err(e) => return Outcome::Err(e),
    };
    let Prepared {
        request,
        lefts,
        rights,
    } = prepared;

    let (sql, params) = match request.build_select(schema) {
        Ok(built) => built,
        Err(e) => return Outcome::Err(e),
    };
    tracing::debug!(sql = %sql, "executing prefetch");
    let mut children = match conn.query(cx, &sql, &params).await {
        Outcome::Ok(rows) => rows,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    if association.destination().has_prefetch() {
        match prefetch(cx, conn, schema, association.destination(), &mut children).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    }

    match attach(association.key(), &lefts, &rights, rows, children) {
        Ok(()) => Outcome::Ok(()),
        Err(e) => Outcome::Err(e),
    }
}

#[derive(Debug)]
struct Prepared {
    request: Relation,
    lefts: Vec<String>,
    rights: Vec<String>,
}

/// Resolve the mapping, plan the key strategy, and apply the key filter.
/// Pure planning: every failure here is reported before any query runs.
fn prepare<S>(
    schema: &S,
    origin: &Relation,
    association: &Association,
    rows: &[Row],
) -> Result<Prepared>
where
    S: SchemaInfo + ?Sized,
{
    let JoinCondition::ForeignKey { hint } = &association.pivot().condition else {
        return Err(Error::Invariant(format!(
            "association '{}' joins through an explicit expression and cannot be prefetched",
            association.key()
        )));
    };

    let origin_table = origin.table_name()?;
    let pivot_table = association.pivot().relation.table_name()?.to_string();
    let mapping = resolve_join_mapping(schema, origin_table, &pivot_table, hint.as_deref())?;

    let request = build_prefetch_request(association, &mapping)?;
    match plan_key_strategy(origin, &mapping)? {
        KeyStrategy::SingleColumn { left, right } => {
            let values = distinct_key_values(rows, &left)?;
            let request =
                request.filter(Expr::qualified(&pivot_table, &right).in_values(values));
            Ok(Prepared {
                request,
                lefts: vec![left],
                rights: vec![right],
            })
        }
        KeyStrategy::CompositeCte {
            lefts,
            rights,
            keys,
        } => {
            let members = rights
                .iter()
                .map(|r| Expr::qualified(&pivot_table, r))
                .collect();
            let request = request
                .with_cte(KEYS_CTE, keys)
                .filter(Expr::row_in_table(members, KEYS_CTE));
            Ok(Prepared {
                request,
                lefts,
                rights,
            })
        }
    }
}

/// Distinct key values of the parent rows, in first-seen order.
fn distinct_key_values(rows: &[Row], column: &str) -> Result<Vec<Value>> {
    let index = parent_index(rows, column)?;
    let mut seen = HashSet::new();
    let mut values = Vec::new();
    for row in rows {
        let value = row.get(index).ok_or_else(|| short_row(column))?;
        if seen.insert(value.clone()) {
            values.push(value.clone());
        }
    }
    Ok(values)
}

/// Group children by aliased key tuple and attach each parent's group.
///
/// Indices resolve once against the first row of each side; all rows of
/// one fetch share a layout.
fn attach(
    key_path: &str,
    lefts: &[String],
    rights: &[String],
    parents: &mut [Row],
    children: Vec<Row>,
) -> Result<()> {
    let mut groups: HashMap<Vec<Value>, Vec<Row>> = HashMap::new();
    if let Some(first) = children.first() {
        let info = first.column_info();
        let mut indices = Vec::with_capacity(rights.len());
        for right in rights {
            let alias = format!("{PREFETCH_PREFIX}{right}");
            let index = info.index_of(&alias).ok_or_else(|| {
                Error::Invariant(format!(
                    "prefetch result is missing key column '{alias}'"
                ))
            })?;
            indices.push(index);
        }
        for child in children {
            let mut key = Vec::with_capacity(indices.len());
            for &index in &indices {
                let value = child.get(index).ok_or_else(|| short_row(rights[0].as_str()))?;
                key.push(value.clone());
            }
            groups.entry(key).or_default().push(child);
        }
    }

    let parent_indices: Vec<usize> = lefts
        .iter()
        .map(|left| parent_index(parents, left))
        .collect::<Result<_>>()?;
    for parent in parents {
        let mut key = Vec::with_capacity(parent_indices.len());
        for &index in &parent_indices {
            let value = parent.get(index).ok_or_else(|| short_row(lefts[0].as_str()))?;
            key.push(value.clone());
        }
        let group = groups.get(&key).cloned().unwrap_or_default();
        parent.set_prefetched(key_path, group);
    }
    Ok(())
}

fn parent_index(rows: &[Row], column: &str) -> Result<usize> {
    let first = rows
        .first()
        .ok_or_else(|| Error::Invariant("prefetch ran against zero rows".to_string()))?;
    first.column_info().index_of(column).ok_or_else(|| {
        Error::Invariant(format!(
            "fetched rows are missing key column '{column}'"
        ))
    })
}

fn short_row(column: &str) -> Error {
    Error::Invariant(format!(
        "row is shorter than its column layout near '{column}'"
    ))
}
