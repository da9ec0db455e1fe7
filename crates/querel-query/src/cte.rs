//! Common table expressions attached to a relation.

use crate::relation::Relation;

/// A named subquery attachable to a relation and referenceable from its
/// predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub relation: Relation,
}

/// Ordered, name-unique CTE list.
///
/// Insertion order is preserved for rendering; inserting an existing name
/// replaces its definition in place (last write wins).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CteList {
    entries: Vec<Cte>,
}

impl CteList {
    /// Empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a CTE by name.
    pub fn insert(&mut self, name: impl Into<String>, relation: Relation) {
        let name = name.into();
        if let Some(existing) = self.entries.iter_mut().find(|c| c.name == name) {
            existing.relation = relation;
        } else {
            self.entries.push(Cte { name, relation });
        }
    }

    /// CTEs in rendering order.
    #[must_use]
    pub fn entries(&self) -> &[Cte] {
        &self.entries
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
