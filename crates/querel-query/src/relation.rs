//! Immutable relation values.
//!
//! A [`Relation`] is a description of a query over one table (or an inner
//! relation used as a subquery source). Every transform consumes the
//! value and returns a new one, so relations can be shared, stored, and
//! refined along separate paths without interference. Nothing touches the
//! database until one of the async fetch helpers runs.
//!
//! Predicates accumulate as a conjunction; ordering and limit are
//! replaced wholesale by each call. Associations attach as joins (which
//! render into the generated statement) or as prefetches (which run as
//! separate follow-up queries after the main fetch).

use asupersync::{Cx, Outcome};
use querel_core::{Connection, Error, FromValue, Result, Row, SchemaInfo};

use crate::association::Association;
use crate::clause::{Assignment, ConflictResolution, LimitClause, OrderingTerm};
use crate::cte::CteList;
use crate::expr::Expr;

/// What a relation selects from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// A named table.
    Table(String),
    /// Another relation, rendered as a parenthesized subquery.
    Subquery(Box<Relation>),
}

/// One item of a relation's selection list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionItem {
    /// A bare expression.
    Expr(Expr),
    /// An expression with an output alias.
    Aliased { expr: Expr, alias: String },
    /// All columns of a table: `table.*`.
    TableStar(String),
}

/// How an association joins into the generated statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// INNER JOIN.
    Required,
    /// LEFT OUTER JOIN.
    Optional,
    /// No SQL join at all; loaded by a follow-up query after the fetch.
    All,
}

/// An association attached to a relation.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedAssociation {
    pub(crate) kind: JoinKind,
    /// Whether the joined table's columns merge into the selection.
    pub(crate) merges_selection: bool,
    pub(crate) association: Association,
}

/// An immutable, composable description of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub(crate) source: Source,
    /// Empty means "select everything".
    pub(crate) selection: Vec<SelectionItem>,
    pub(crate) predicates: Vec<Expr>,
    pub(crate) distinct: bool,
    pub(crate) grouping: Vec<Expr>,
    pub(crate) having: Vec<Expr>,
    pub(crate) ordering: Vec<OrderingTerm>,
    pub(crate) limit: Option<LimitClause>,
    pub(crate) ctes: CteList,
    pub(crate) joins: Vec<JoinedAssociation>,
}

impl Relation {
    fn from_source(source: Source) -> Self {
        Self {
            source,
            selection: Vec::new(),
            predicates: Vec::new(),
            distinct: false,
            grouping: Vec::new(),
            having: Vec::new(),
            ordering: Vec::new(),
            limit: None,
            ctes: CteList::new(),
            joins: Vec::new(),
        }
    }

    /// Relation over all rows of a table.
    pub fn table(name: impl Into<String>) -> Self {
        Self::from_source(Source::Table(name.into()))
    }

    /// Relation over the rows produced by another relation.
    #[must_use]
    pub fn subquery(inner: Relation) -> Self {
        Self::from_source(Source::Subquery(Box::new(inner)))
    }

    /// Name of the backing table. Subquery-sourced relations have none.
    pub fn table_name(&self) -> Result<&str> {
        match &self.source {
            Source::Table(name) => Ok(name),
            Source::Subquery(_) => Err(Error::Unsupported(
                "operation requires a table-backed relation, found a subquery source".to_string(),
            )),
        }
    }

    /// Replace the selection list.
    #[must_use]
    pub fn select(mut self, items: Vec<SelectionItem>) -> Self {
        self.selection = items;
        self
    }

    /// Replace the selection with plain columns.
    #[must_use]
    pub fn select_columns(self, columns: &[&str]) -> Self {
        self.select(
            columns
                .iter()
                .map(|c| SelectionItem::Expr(Expr::col(*c)))
                .collect(),
        )
    }

    /// Append an aliased expression to the selection.
    ///
    /// An empty selection means "everything"; annotating such a relation
    /// first pins the existing columns as `table.*` so they are kept
    /// alongside the new item.
    #[must_use]
    pub fn annotate(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        if self.selection.is_empty() {
            if let Source::Table(name) = &self.source {
                self.selection.push(SelectionItem::TableStar(name.clone()));
            }
        }
        self.selection.push(SelectionItem::Aliased {
            expr,
            alias: alias.into(),
        });
        self
    }

    /// Add a predicate. Predicates accumulate and are ANDed together.
    #[must_use]
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Request DISTINCT rows. Idempotent.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Append GROUP BY expressions.
    #[must_use]
    pub fn group(mut self, exprs: Vec<Expr>) -> Self {
        self.grouping.extend(exprs);
        self
    }

    /// Append GROUP BY columns by name.
    #[must_use]
    pub fn group_columns(self, columns: &[&str]) -> Self {
        self.group(columns.iter().map(|c| Expr::col(*c)).collect())
    }

    /// Add a HAVING predicate. Accumulates like `filter`.
    #[must_use]
    pub fn having(mut self, predicate: Expr) -> Self {
        self.having.push(predicate);
        self
    }

    /// Replace the ordering wholesale.
    #[must_use]
    pub fn order(mut self, terms: Vec<OrderingTerm>) -> Self {
        self.ordering = terms;
        self
    }

    /// Flip the direction of every ordering term. Identity on an
    /// unordered relation.
    #[must_use]
    pub fn reversed(mut self) -> Self {
        self.ordering = self.ordering.into_iter().map(OrderingTerm::reversed).collect();
        self
    }

    /// Replace the limit.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(LimitClause::new(limit));
        self
    }

    /// Replace the limit and offset.
    #[must_use]
    pub fn limit_with_offset(mut self, limit: u64, offset: u64) -> Self {
        self.limit = Some(LimitClause::with_offset(limit, offset));
        self
    }

    /// Attach (or redefine) a named CTE referenceable from predicates.
    #[must_use]
    pub fn with_cte(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.ctes.insert(name, relation);
        self
    }

    fn join(mut self, kind: JoinKind, merges_selection: bool, association: Association) -> Self {
        self.joins.push(JoinedAssociation {
            kind,
            merges_selection,
            association,
        });
        self
    }

    /// INNER JOIN the association and merge its columns into the
    /// selection.
    #[must_use]
    pub fn include_required(self, association: Association) -> Self {
        self.join(JoinKind::Required, true, association)
    }

    /// LEFT OUTER JOIN the association and merge its columns into the
    /// selection.
    #[must_use]
    pub fn include_optional(self, association: Association) -> Self {
        self.join(JoinKind::Optional, true, association)
    }

    /// INNER JOIN the association for filtering only; its columns stay
    /// out of the selection.
    #[must_use]
    pub fn joining_required(self, association: Association) -> Self {
        self.join(JoinKind::Required, false, association)
    }

    /// LEFT OUTER JOIN the association for filtering only.
    #[must_use]
    pub fn joining_optional(self, association: Association) -> Self {
        self.join(JoinKind::Optional, false, association)
    }

    /// Register the association for prefetching: after the main fetch, a
    /// follow-up query loads the associated rows of every fetched row and
    /// attaches them under the association key.
    #[must_use]
    pub fn include_all(self, association: Association) -> Self {
        self.join(JoinKind::All, false, association)
    }

    /// Whether any association is registered for prefetching.
    #[must_use]
    pub fn has_prefetch(&self) -> bool {
        self.joins.iter().any(|j| j.kind == JoinKind::All)
    }

    /// Prefetched associations in registration order.
    pub(crate) fn prefetch_associations(&self) -> impl Iterator<Item = &Association> {
        self.joins
            .iter()
            .filter(|j| j.kind == JoinKind::All)
            .map(|j| &j.association)
    }

    /// SQL joins (everything except prefetches) in registration order.
    pub(crate) fn sql_joins(&self) -> impl Iterator<Item = &JoinedAssociation> {
        self.joins.iter().filter(|j| j.kind != JoinKind::All)
    }
}

/// Async execution helpers. Each builds SQL, runs it over the supplied
/// connection, and forwards cancellation verbatim.
impl Relation {
    /// Fetch all rows, then run registered prefetches against them.
    #[tracing::instrument(skip_all)]
    pub async fn fetch_all<C, S>(&self, cx: &Cx, conn: &C, schema: &S) -> Outcome<Vec<Row>, Error>
    where
        C: Connection,
        S: SchemaInfo + Sync,
    {
        let (sql, params) = match self.build_select(schema) {
            Ok(built) => built,
            Err(e) => return Outcome::Err(e),
        };
        tracing::debug!(sql = %sql, params = params.len(), "executing select");
        let mut rows = match conn.query(cx, &sql, &params).await {
            Outcome::Ok(rows) => rows,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        if self.has_prefetch() {
            match crate::prefetch::prefetch(cx, conn, schema, self, &mut rows).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
        Outcome::Ok(rows)
    }

    /// Fetch the first row, if any. Prefetches apply to it as well.
    pub async fn fetch_one<C, S>(&self, cx: &Cx, conn: &C, schema: &S) -> Outcome<Option<Row>, Error>
    where
        C: Connection,
        S: SchemaInfo + Sync,
    {
        match self.clone().limit(1).fetch_all(cx, conn, schema).await {
            Outcome::Ok(rows) => Outcome::Ok(rows.into_iter().next()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Count matching rows by wrapping the relation in
    /// `SELECT COUNT(*) FROM (...)`, which keeps DISTINCT, GROUP BY, and
    /// LIMIT semantics intact.
    pub async fn fetch_count<C, S>(&self, cx: &Cx, conn: &C, schema: &S) -> Outcome<u64, Error>
    where
        C: Connection,
        S: SchemaInfo + Sync,
    {
        let (sql, params) = match self.build_count(schema) {
            Ok(built) => built,
            Err(e) => return Outcome::Err(e),
        };
        tracing::debug!(sql = %sql, "executing count");
        match conn.query_one(cx, &sql, &params).await {
            Outcome::Ok(Some(row)) => match scalar::<i64>(&row) {
                Ok(n) => Outcome::Ok(u64::try_from(n).unwrap_or(0)),
                Err(e) => Outcome::Err(e),
            },
            Outcome::Ok(None) => Outcome::Err(Error::Query(querel_core::QueryError::new(
                "count query returned no row",
                Some(sql),
            ))),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Whether any row matches, via `SELECT EXISTS (...)`.
    pub async fn exists<C, S>(&self, cx: &Cx, conn: &C, schema: &S) -> Outcome<bool, Error>
    where
        C: Connection,
        S: SchemaInfo + Sync,
    {
        let (sql, params) = match self.build_exists(schema) {
            Ok(built) => built,
            Err(e) => return Outcome::Err(e),
        };
        match conn.query_one(cx, &sql, &params).await {
            Outcome::Ok(Some(row)) => match scalar::<bool>(&row) {
                Ok(b) => Outcome::Ok(b),
                Err(e) => Outcome::Err(e),
            },
            Outcome::Ok(None) => Outcome::Err(Error::Query(querel_core::QueryError::new(
                "exists query returned no row",
                Some(sql),
            ))),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Whether no row matches.
    pub async fn is_empty<C, S>(&self, cx: &Cx, conn: &C, schema: &S) -> Outcome<bool, Error>
    where
        C: Connection,
        S: SchemaInfo + Sync,
    {
        match self.exists(cx, conn, schema).await {
            Outcome::Ok(found) => Outcome::Ok(!found),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Delete all matching rows; returns the affected-row count.
    pub async fn delete_all<C>(&self, cx: &Cx, conn: &C) -> Outcome<u64, Error>
    where
        C: Connection,
    {
        let (sql, params) = match self.build_delete() {
            Ok(built) => built,
            Err(e) => return Outcome::Err(e),
        };
        tracing::debug!(sql = %sql, "executing delete");
        conn.execute(cx, &sql, &params).await
    }

    /// Apply assignments to all matching rows; returns the affected-row
    /// count. With no assignments there is nothing to execute and the
    /// count is zero.
    pub async fn update_all<C>(
        &self,
        cx: &Cx,
        conn: &C,
        assignments: &[Assignment],
        resolution: ConflictResolution,
    ) -> Outcome<u64, Error>
    where
        C: Connection,
    {
        let built = match self.build_update(assignments, resolution) {
            Ok(built) => built,
            Err(e) => return Outcome::Err(e),
        };
        let Some((sql, params)) = built else {
            return Outcome::Ok(0);
        };
        tracing::debug!(sql = %sql, "executing update");
        conn.execute(cx, &sql, &params).await
    }
}

/// First column of a single-row result, decoded.
fn scalar<T: FromValue>(row: &Row) -> Result<T> {
    let value = row
        .get(0)
        .ok_or_else(|| Error::Invariant("scalar query returned an empty row".to_string()))?;
    T::from_value(value)
}
