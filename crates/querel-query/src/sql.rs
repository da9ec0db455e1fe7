//! SQL generation for relation values.
//!
//! One statement renders into one SQL string plus one parameter vector.
//! The vector is threaded through every clause in textual order, so `$n`
//! placeholders always number left to right across the whole statement,
//! CTE prelude included.
//!
//! Table names and output aliases render unquoted; column references go
//! through [`Expr`] and are quoted there.

use querel_core::{Error, Result, SchemaInfo, Value};

use crate::association::{resolve_join_mapping, JoinCondition};
use crate::clause::{Assignment, ConflictResolution};
use crate::expr::{quote_identifier, Expr};
use crate::relation::{JoinKind, Relation, SelectionItem, Source};

impl Relation {
    /// Render the SELECT statement for this relation.
    #[tracing::instrument(skip_all)]
    pub fn build_select<S>(&self, schema: &S) -> Result<(String, Vec<Value>)>
    where
        S: SchemaInfo + ?Sized,
    {
        let mut params = Vec::new();
        let sql = self.render_select(schema, &mut params)?;
        Ok((sql, params))
    }

    /// Render `SELECT EXISTS (...)` around this relation.
    pub fn build_exists<S>(&self, schema: &S) -> Result<(String, Vec<Value>)>
    where
        S: SchemaInfo + ?Sized,
    {
        let mut params = Vec::new();
        let inner = self.render_select(schema, &mut params)?;
        Ok((format!("SELECT EXISTS ({inner})"), params))
    }

    /// Render `SELECT COUNT(*) FROM (...)` around this relation, keeping
    /// DISTINCT, GROUP BY, and LIMIT semantics of the inner query intact.
    pub fn build_count<S>(&self, schema: &S) -> Result<(String, Vec<Value>)>
    where
        S: SchemaInfo + ?Sized,
    {
        let mut params = Vec::new();
        let inner = self.render_select(schema, &mut params)?;
        Ok((format!("SELECT COUNT(*) FROM ({inner})"), params))
    }

    /// Render the DELETE statement for this relation.
    ///
    /// Joins and subquery sources are not expressible as a DELETE.
    pub fn build_delete(&self) -> Result<(String, Vec<Value>)> {
        let table = self.delete_update_table("DELETE")?;
        let mut params = Vec::new();
        let mut sql = String::new();
        // CTEs stay renderable; predicates may reference them.
        self.render_cte_prelude_flat(&mut sql, &mut params)?;
        sql.push_str("DELETE FROM ");
        sql.push_str(table);
        self.render_where(&mut sql, &mut params);
        Ok((sql, params))
    }

    /// Render the UPDATE statement for this relation.
    ///
    /// With no assignments there is no statement to run and `None` is
    /// returned. Joins and subquery sources are not expressible as an
    /// UPDATE.
    pub fn build_update(
        &self,
        assignments: &[Assignment],
        resolution: ConflictResolution,
    ) -> Result<Option<(String, Vec<Value>)>> {
        let table = self.delete_update_table("UPDATE")?;
        if assignments.is_empty() {
            return Ok(None);
        }
        let mut params = Vec::new();
        let mut sql = String::new();
        self.render_cte_prelude_flat(&mut sql, &mut params)?;
        sql.push_str("UPDATE ");
        if resolution != ConflictResolution::Abort {
            sql.push_str("OR ");
            sql.push_str(resolution.as_sql());
            sql.push(' ');
        }
        sql.push_str(table);
        sql.push_str(" SET ");
        for (i, assignment) in assignments.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&quote_identifier(&assignment.column));
            sql.push_str(" = ");
            sql.push_str(&assignment.value.build(&mut params, 0));
        }
        self.render_where(&mut sql, &mut params);
        Ok(Some((sql, params)))
    }

    fn delete_update_table(&self, statement: &str) -> Result<&str> {
        if self.sql_joins().next().is_some() {
            return Err(Error::Unsupported(format!(
                "{statement} cannot target a relation with joins"
            )));
        }
        match &self.source {
            Source::Table(name) => Ok(name),
            Source::Subquery(_) => Err(Error::Unsupported(format!(
                "{statement} cannot target a subquery-sourced relation"
            ))),
        }
    }

    fn render_select<S>(&self, schema: &S, params: &mut Vec<Value>) -> Result<String>
    where
        S: SchemaInfo + ?Sized,
    {
        let mut sql = String::new();

        if !self.ctes.is_empty() {
            sql.push_str("WITH ");
            for (i, cte) in self.ctes.entries().iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&cte.name);
                sql.push_str(" AS (");
                sql.push_str(&cte.relation.render_select(schema, params)?);
                sql.push(')');
            }
            sql.push(' ');
        }

        // Star tables of selection-merging joins, resolved before the
        // selection renders but without touching params: join ON
        // expressions render later so placeholder numbering follows
        // textual order.
        let merged_stars = self.merged_star_tables()?;

        sql.push_str("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        self.render_selection(&mut sql, params, &merged_stars);

        sql.push_str(" FROM ");
        match &self.source {
            Source::Table(name) => sql.push_str(name),
            Source::Subquery(inner) => {
                sql.push('(');
                sql.push_str(&inner.render_select(schema, params)?);
                sql.push(')');
            }
        }

        self.render_joins(schema, &mut sql, params)?;
        self.render_where(&mut sql, params);

        if !self.grouping.is_empty() {
            sql.push_str(" GROUP BY ");
            for (i, expr) in self.grouping.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&expr.build(params, 0));
            }
        }

        if let Some(having) = conjoin(&self.having) {
            sql.push_str(" HAVING ");
            sql.push_str(&having.build(params, 0));
        }

        if !self.ordering.is_empty() {
            sql.push_str(" ORDER BY ");
            for (i, term) in self.ordering.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&term.build(params, 0));
            }
        }

        if let Some(limit) = &self.limit {
            sql.push_str(&format!(" LIMIT {}", limit.limit));
            if let Some(offset) = limit.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        Ok(sql)
    }

    /// Destination tables of selection-merging joins, in registration
    /// order. Only the final hop of a chain contributes columns.
    fn merged_star_tables(&self) -> Result<Vec<String>> {
        let mut tables = Vec::new();
        for join in self.sql_joins() {
            if join.merges_selection {
                let dest = join.association.destination().table_name()?;
                tables.push(dest.to_string());
            }
        }
        Ok(tables)
    }

    fn render_selection(&self, sql: &mut String, params: &mut Vec<Value>, merged_stars: &[String]) {
        let mut first = true;
        let mut sep = |sql: &mut String| {
            if !first {
                sql.push_str(", ");
            }
            first = false;
        };

        if self.selection.is_empty() {
            sep(sql);
            if merged_stars.is_empty() {
                sql.push('*');
            } else if let Source::Table(name) = &self.source {
                sql.push_str(name);
                sql.push_str(".*");
            } else {
                sql.push('*');
            }
        } else {
            for item in &self.selection {
                sep(sql);
                match item {
                    SelectionItem::Expr(expr) => sql.push_str(&expr.build(params, 0)),
                    SelectionItem::Aliased { expr, alias } => {
                        sql.push_str(&expr.build(params, 0));
                        sql.push_str(" AS ");
                        sql.push_str(alias);
                    }
                    SelectionItem::TableStar(table) => {
                        sql.push_str(table);
                        sql.push_str(".*");
                    }
                }
            }
        }

        for table in merged_stars {
            sep(sql);
            sql.push_str(table);
            sql.push_str(".*");
        }
    }

    fn render_joins<S>(&self, schema: &S, sql: &mut String, params: &mut Vec<Value>) -> Result<()>
    where
        S: SchemaInfo + ?Sized,
    {
        if self.sql_joins().next().is_none() {
            return Ok(());
        }
        let origin = self.table_name()?.to_string();
        for join in self.sql_joins() {
            let keyword = match join.kind {
                JoinKind::Required => "JOIN",
                JoinKind::Optional => "LEFT OUTER JOIN",
                JoinKind::All => unreachable!("prefetch joins never render into SQL"),
            };
            let mut parent = origin.clone();
            for hop in join.association.hops() {
                let hop_table = hop.relation.table_name()?.to_string();
                let mut on = match &hop.condition {
                    JoinCondition::ForeignKey { hint } => {
                        resolve_join_mapping(schema, &parent, &hop_table, hint.as_deref())?
                            .on_expr(&parent, &hop_table)
                    }
                    JoinCondition::Expression(expr) => expr.clone(),
                };
                for predicate in &hop.relation.predicates {
                    on = on.and(predicate.clone());
                }
                sql.push(' ');
                sql.push_str(keyword);
                sql.push(' ');
                sql.push_str(&hop_table);
                sql.push_str(" ON ");
                sql.push_str(&on.build(params, 0));
                parent = hop_table;
            }
        }
        Ok(())
    }

    fn render_where(&self, sql: &mut String, params: &mut Vec<Value>) {
        if let Some(predicate) = conjoin(&self.predicates) {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate.build(params, 0));
        }
    }

    /// CTE prelude for DELETE/UPDATE, where the definitions may only be
    /// flat selects (no further schema resolution available).
    fn render_cte_prelude_flat(&self, sql: &mut String, params: &mut Vec<Value>) -> Result<()> {
        if self.ctes.is_empty() {
            return Ok(());
        }
        sql.push_str("WITH ");
        for (i, cte) in self.ctes.entries().iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&cte.name);
            sql.push_str(" AS (");
            sql.push_str(&cte.relation.render_select(&NoSchema, params)?);
            sql.push(')');
        }
        sql.push(' ');
        Ok(())
    }
}

/// AND-fold a predicate list; `None` when empty.
fn conjoin(predicates: &[Expr]) -> Option<Expr> {
    let mut iter = predicates.iter().cloned();
    let first = iter.next()?;
    Some(iter.fold(first, Expr::and))
}

/// Schema stand-in for statement kinds that cannot resolve joins anyway.
struct NoSchema;

impl SchemaInfo for NoSchema {
    fn columns(&self, table: &str) -> Result<Vec<String>> {
        Err(Error::Unsupported(format!(
            "schema lookup for '{table}' inside a write statement's CTE"
        )))
    }

    fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        self.columns(table)
    }

    fn foreign_keys(&self, table: &str) -> Result<Vec<querel_core::ForeignKeyInfo>> {
        Err(Error::Unsupported(format!(
            "schema lookup for '{table}' inside a write statement's CTE"
        )))
    }
}
