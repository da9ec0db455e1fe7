//! Associations between relations and foreign-key join mappings.
//!
//! An association is a directed edge from an origin relation to a
//! destination relation through a pivot. For a direct association the
//! pivot *is* the destination; a through-association chains one or more
//! intermediate hops (e.g. a join table) between origin and destination.
//!
//! The join condition of the first hop relates the origin to the pivot.
//! Foreign-key conditions are resolved lazily against [`SchemaInfo`] into
//! an ordered [`JoinMapping`]; explicit expression conditions render as
//! given but are rejected by the prefetch path.

use querel_core::{Error, ForeignKeyInfo, Result, SchemaError, SchemaErrorKind, SchemaInfo};

use crate::expr::Expr;
use crate::relation::Relation;

/// How a pivot relates to its origin.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    /// Equi-join derived from a schema foreign key. The optional hint
    /// names the constraint's first declaring-side column and
    /// disambiguates between multiple candidate constraints.
    ForeignKey { hint: Option<String> },
    /// Explicit boolean join expression. Renders into SQL joins but is a
    /// contract violation in the prefetch path.
    Expression(Expr),
}

/// Ordered (origin-column, destination-column) pairs of a foreign-key
/// equi-join.
///
/// Pair order is significant: it defines the positional correspondence
/// used for composite-key predicates and composite grouping keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinMapping {
    pairs: Vec<(String, String)>,
}

impl JoinMapping {
    /// Create a mapping from ordered column pairs. Mappings are never
    /// empty.
    pub fn new(pairs: Vec<(String, String)>) -> Result<Self> {
        if pairs.is_empty() {
            return Err(Error::Invariant(
                "join mapping must contain at least one column pair".to_string(),
            ));
        }
        Ok(Self { pairs })
    }

    /// Orient a foreign-key constraint relative to an origin table.
    ///
    /// If the origin declares the constraint, pairs run (declaring,
    /// referenced); if the origin is the referenced table, they run
    /// (referenced, declaring). Any other origin is a caller bug.
    pub fn from_foreign_key(fk: &ForeignKeyInfo, origin_table: &str) -> Result<Self> {
        let pairs = if fk.origin_table == origin_table {
            fk.columns.clone()
        } else if fk.destination_table == origin_table {
            fk.columns
                .iter()
                .map(|(decl, referenced)| (referenced.clone(), decl.clone()))
                .collect()
        } else {
            return Err(Error::Invariant(format!(
                "foreign key between '{}' and '{}' does not involve origin '{}'",
                fk.origin_table, fk.destination_table, origin_table
            )));
        };
        Self::new(pairs)
    }

    /// Number of column pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the mapping is empty (never true for constructed values).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The ordered column pairs.
    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Origin-side columns, in pair order.
    #[must_use]
    pub fn left_columns(&self) -> Vec<String> {
        self.pairs.iter().map(|(l, _)| l.clone()).collect()
    }

    /// Destination-side columns, in pair order.
    #[must_use]
    pub fn right_columns(&self) -> Vec<String> {
        self.pairs.iter().map(|(_, r)| r.clone()).collect()
    }

    /// Equi-join expression over qualified columns:
    /// `left.l1 = right.r1 AND left.l2 = right.r2 ...`
    #[must_use]
    pub fn on_expr(&self, left_table: &str, right_table: &str) -> Expr {
        let mut iter = self.pairs.iter();
        // Constructor guarantees at least one pair.
        let (l, r) = iter.next().expect("join mapping is never empty");
        let mut expr = Expr::qualified(left_table, l).eq(Expr::qualified(right_table, r));
        for (l, r) in iter {
            expr = expr.and(Expr::qualified(left_table, l).eq(Expr::qualified(right_table, r)));
        }
        expr
    }
}

/// Resolve the join mapping between an origin table and a pivot table.
///
/// Candidate constraints are searched on both sides: foreign keys the
/// pivot declares against the origin and foreign keys the origin declares
/// against the pivot. Zero candidates, or more than one without a
/// disambiguating hint, is a schema-usage error.
pub fn resolve_join_mapping<S: SchemaInfo + ?Sized>(
    schema: &S,
    origin_table: &str,
    pivot_table: &str,
    hint: Option<&str>,
) -> Result<JoinMapping> {
    let mut candidates: Vec<ForeignKeyInfo> = Vec::new();
    for fk in schema.foreign_keys(pivot_table)? {
        if fk.destination_table == origin_table {
            candidates.push(fk);
        }
    }
    for fk in schema.foreign_keys(origin_table)? {
        if fk.destination_table == pivot_table {
            candidates.push(fk);
        }
    }

    if let Some(hint) = hint {
        candidates.retain(|fk| fk.columns.first().is_some_and(|(decl, _)| decl == hint));
    }

    match candidates.len() {
        0 => Err(SchemaError::new(
            SchemaErrorKind::MissingForeignKey,
            origin_table,
            format!("no foreign key relates '{origin_table}' to '{pivot_table}'"),
        )
        .into()),
        1 => JoinMapping::from_foreign_key(&candidates[0], origin_table),
        n => Err(SchemaError::new(
            SchemaErrorKind::AmbiguousForeignKey,
            origin_table,
            format!(
                "{n} foreign keys relate '{origin_table}' to '{pivot_table}'; \
                 disambiguate with a key column hint"
            ),
        )
        .into()),
    }
}

/// One hop of an association chain: a relation and the condition relating
/// it to the previous hop (or to the origin, for the first hop).
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub(crate) relation: Relation,
    pub(crate) condition: JoinCondition,
}

/// A directed edge from an origin relation to a destination relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    key: String,
    hops: Vec<Hop>,
}

impl Association {
    /// Assemble an association from pre-built hops. Used by the prefetch
    /// engine to join a destination back toward its pivot.
    pub(crate) fn from_hops(key: &str, hops: Vec<Hop>) -> Self {
        Self {
            key: key.to_string(),
            hops,
        }
    }

    fn single(key: &str, table: &str) -> Self {
        Self {
            key: key.to_string(),
            hops: vec![Hop {
                relation: Relation::table(table),
                condition: JoinCondition::ForeignKey { hint: None },
            }],
        }
    }

    /// To-many association against a child table, joined through the
    /// foreign key relating it to the origin.
    #[must_use]
    pub fn has_many(key: &str, table: &str) -> Self {
        Self::single(key, table)
    }

    /// To-one association against a parent table, joined through the
    /// foreign key the origin declares against it.
    #[must_use]
    pub fn belongs_to(key: &str, table: &str) -> Self {
        Self::single(key, table)
    }

    /// Association over an explicit join expression. Usable for SQL
    /// joins and CTE-style subqueries, never for prefetching.
    #[must_use]
    pub fn joined(key: &str, relation: Relation, on: Expr) -> Self {
        Self {
            key: key.to_string(),
            hops: vec![Hop {
                relation,
                condition: JoinCondition::Expression(on),
            }],
        }
    }

    /// Through-association: `pivot` relates the origin to an
    /// intermediate relation, `destination` relates that intermediate to
    /// the final destination. Chains compose, so the destination may
    /// itself be a through-association.
    #[must_use]
    pub fn through(key: &str, pivot: Association, destination: Association) -> Self {
        let mut hops = pivot.hops;
        hops.extend(destination.hops);
        Self {
            key: key.to_string(),
            hops,
        }
    }

    /// Disambiguate the origin-side foreign key by its first declaring
    /// column. No effect on expression conditions.
    #[must_use]
    pub fn with_hint(mut self, column: &str) -> Self {
        if let Some(first) = self.hops.first_mut() {
            if let JoinCondition::ForeignKey { hint } = &mut first.condition {
                *hint = Some(column.to_string());
            }
        }
        self
    }

    /// Transform the destination relation.
    #[must_use]
    pub fn map_destination(mut self, f: impl FnOnce(Relation) -> Relation) -> Self {
        if let Some(last) = self.hops.last_mut() {
            let relation = std::mem::replace(&mut last.relation, Relation::table(""));
            last.relation = f(relation);
        }
        self
    }

    /// Filter the destination relation.
    #[must_use]
    pub fn filter(self, expr: Expr) -> Self {
        self.map_destination(|r| r.filter(expr))
    }

    /// Register a nested prefetched association on the destination.
    #[must_use]
    pub fn include_all(self, association: Association) -> Self {
        self.map_destination(|r| r.include_all(association))
    }

    /// Association key-path under which prefetched rows are stored.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// First hop: the pivot relating the origin to the chain.
    pub(crate) fn pivot(&self) -> &Hop {
        &self.hops[0]
    }

    /// All hops in origin-to-destination order.
    pub(crate) fn hops(&self) -> &[Hop] {
        &self.hops
    }

    /// Final destination relation.
    pub(crate) fn destination(&self) -> &Relation {
        &self.hops[self.hops.len() - 1].relation
    }
}
