//! Composable relation values, SQL generation, and association
//! prefetching.
//!
//! A [`Relation`] is an immutable description of a query; transforms
//! return new values, so relations compose freely before anything runs.
//! SQL generation renders a relation into one statement with positional
//! `$n` parameters. Associations attach as SQL joins or as prefetches:
//! a prefetched association loads its rows in exactly one follow-up
//! query per association and attaches them to the fetched rows.
//!
//! ```rust,ignore
//! let adults = Relation::table("players")
//!     .filter(Expr::col("age").ge(18))
//!     .order(vec![OrderingTerm::asc(Expr::col("name"))]);
//!
//! let teams = Relation::table("teams")
//!     .include_all(Association::has_many("players", "players"));
//! let rows = teams.fetch_all(&cx, &conn, &schema).await?;
//! ```

pub mod association;
pub mod clause;
pub mod cte;
pub mod expr;
mod prefetch;
pub mod region;
pub mod relation;
mod sql;

pub use association::{resolve_join_mapping, Association, JoinCondition, JoinMapping};
pub use clause::{
    Assignment, ConflictResolution, HasDefaultConflictResolution, LimitClause, NullsOrder,
    OrderDirection, OrderingTerm,
};
pub use cte::{Cte, CteList};
pub use expr::{quote_identifier, BinaryOp, Expr};
pub use region::{DatabaseRegion, TableRegion};
pub use relation::{JoinKind, JoinedAssociation, Relation, SelectionItem, Source};
