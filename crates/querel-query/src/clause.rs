//! Ordering, limit, assignment, and conflict-policy clause types.

use querel_core::Value;

use crate::expr::Expr;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    /// The opposite direction.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            OrderDirection::Asc => OrderDirection::Desc,
            OrderDirection::Desc => OrderDirection::Asc,
        }
    }
}

/// NULLS FIRST/LAST ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingTerm {
    expr: Expr,
    direction: OrderDirection,
    nulls: Option<NullsOrder>,
}

impl OrderingTerm {
    /// Ascending order on an expression.
    pub fn asc(expr: impl Into<Expr>) -> Self {
        Self {
            expr: expr.into(),
            direction: OrderDirection::Asc,
            nulls: None,
        }
    }

    /// Descending order on an expression.
    pub fn desc(expr: impl Into<Expr>) -> Self {
        Self {
            expr: expr.into(),
            direction: OrderDirection::Desc,
            nulls: None,
        }
    }

    /// Set NULLS FIRST.
    #[must_use]
    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    /// Set NULLS LAST.
    #[must_use]
    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }

    /// Term with the opposite direction (NULLS ordering untouched).
    #[must_use]
    pub fn reversed(self) -> Self {
        Self {
            direction: self.direction.reversed(),
            ..self
        }
    }

    /// Render this term's SQL.
    pub fn build(&self, params: &mut Vec<Value>, offset: usize) -> String {
        let mut sql = self.expr.build(params, offset);
        sql.push_str(match self.direction {
            OrderDirection::Asc => " ASC",
            OrderDirection::Desc => " DESC",
        });
        if let Some(nulls) = self.nulls {
            sql.push_str(match nulls {
                NullsOrder::First => " NULLS FIRST",
                NullsOrder::Last => " NULLS LAST",
            });
        }
        sql
    }
}

/// LIMIT with optional OFFSET. Each `limit` call on a relation replaces
/// the previous clause wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitClause {
    pub limit: u64,
    pub offset: Option<u64>,
}

impl LimitClause {
    /// LIMIT without OFFSET.
    #[must_use]
    pub const fn new(limit: u64) -> Self {
        Self {
            limit,
            offset: None,
        }
    }

    /// LIMIT with OFFSET.
    #[must_use]
    pub const fn with_offset(limit: u64, offset: u64) -> Self {
        Self {
            limit,
            offset: Some(offset),
        }
    }
}

/// One SET clause entry of an UPDATE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}

impl Assignment {
    /// Assign an expression to a column.
    pub fn set(column: impl Into<String>, value: impl Into<Expr>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Conflict policy applied by the engine when a write violates a
/// constraint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Abort the statement and roll it back (engine default).
    #[default]
    Abort,
    /// Abort the statement and roll back the enclosing transaction.
    Rollback,
    /// Abort the statement but keep prior changes of the same statement.
    Fail,
    /// Skip the conflicting row.
    Ignore,
    /// Replace the conflicting row.
    Replace,
}

impl ConflictResolution {
    /// SQL keyword for this policy.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ConflictResolution::Abort => "ABORT",
            ConflictResolution::Rollback => "ROLLBACK",
            ConflictResolution::Fail => "FAIL",
            ConflictResolution::Ignore => "IGNORE",
            ConflictResolution::Replace => "REPLACE",
        }
    }
}

/// Capability trait for record types that declare their own conflict
/// policy for batch updates. Resolved statically; types that do not
/// implement it get [`ConflictResolution::Abort`] through the default.
pub trait HasDefaultConflictResolution {
    /// Policy applied when the caller does not pass one explicitly.
    const DEFAULT_CONFLICT_RESOLUTION: ConflictResolution = ConflictResolution::Abort;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_term_renders_direction_and_nulls() {
        let mut params = Vec::new();
        assert_eq!(
            OrderingTerm::asc(Expr::col("name")).build(&mut params, 0),
            "\"name\" ASC"
        );
        assert_eq!(
            OrderingTerm::desc(Expr::col("score"))
                .nulls_last()
                .build(&mut params, 0),
            "\"score\" DESC NULLS LAST"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn reversing_flips_direction_only() {
        let term = OrderingTerm::asc(Expr::col("name")).nulls_first().reversed();
        let mut params = Vec::new();
        assert_eq!(term.build(&mut params, 0), "\"name\" DESC NULLS FIRST");
    }

    #[test]
    fn default_conflict_resolution_is_abort() {
        struct Plain;
        impl HasDefaultConflictResolution for Plain {}

        struct Upserting;
        impl HasDefaultConflictResolution for Upserting {
            const DEFAULT_CONFLICT_RESOLUTION: ConflictResolution = ConflictResolution::Replace;
        }

        assert_eq!(
            Plain::DEFAULT_CONFLICT_RESOLUTION,
            ConflictResolution::Abort
        );
        assert_eq!(
            Upserting::DEFAULT_CONFLICT_RESOLUTION,
            ConflictResolution::Replace
        );
    }
}
