//! SQL expressions for relation predicates, selections, and orderings.
//!
//! Expressions render to SQL text plus positional `$n` placeholders. The
//! renderer threads one shared parameter vector through the whole
//! statement, so placeholder numbering follows textual order.

use querel_core::Value;

/// Quote an identifier, doubling embedded quote characters.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// A SQL expression usable in WHERE, HAVING, selections, and orderings.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference with optional table qualifier
    Column {
        /// Optional table name or alias
        table: Option<String>,
        /// Column name
        name: String,
    },

    /// Literal value bound as a parameter
    Literal(Value),

    /// Binary operation (e.g., a = b, a AND b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Logical NOT
    Not(Box<Expr>),

    /// IN list: expr IN (v1, v2, ...)
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// Composite row-value membership against a named table or CTE:
    /// (e1, e2, ...) IN table
    InTable { exprs: Vec<Expr>, table: String },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// Parenthesized expression
    Paren(Box<Expr>),

    /// Special aggregate: COUNT(*)
    CountStar,

    /// Raw SQL fragment (escape hatch)
    Raw(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// Logical AND
    And,
    /// Logical OR
    Or,
}

impl BinaryOp {
    /// SQL text for this operator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

impl Expr {
    /// Unqualified column reference.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    /// Table-qualified column reference.
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    /// Literal value bound as a parameter.
    pub fn val(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Raw SQL fragment.
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    /// COUNT(*) aggregate.
    #[must_use]
    pub fn count_star() -> Self {
        Expr::CountStar
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    /// Equality (=)
    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// Inequality (<>)
    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    /// Less than (<)
    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// Less than or equal (<=)
    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    /// Greater than (>)
    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// Greater than or equal (>=)
    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    /// Logical AND
    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// Logical OR
    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// Logical NOT
    #[must_use]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// IS NULL
    #[must_use]
    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// IS NOT NULL
    #[must_use]
    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    /// Membership in a list of values: expr IN ($1, $2, ...)
    #[must_use]
    pub fn in_values(self, values: impl IntoIterator<Item = Value>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Expr::Literal).collect(),
            negated: false,
        }
    }

    /// Composite row-value membership against a named table or CTE:
    /// (e1, e2, ...) IN table
    #[must_use]
    pub fn row_in_table(exprs: Vec<Expr>, table: impl Into<String>) -> Self {
        Expr::InTable {
            exprs,
            table: table.into(),
        }
    }

    /// Wrap in parentheses.
    #[must_use]
    pub fn paren(self) -> Self {
        Expr::Paren(Box::new(self))
    }

    /// If this expression is a plain (possibly qualified) column
    /// reference, return the column name.
    #[must_use]
    pub fn as_column(&self) -> Option<&str> {
        match self {
            Expr::Column { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Build SQL text, appending bound parameters.
    ///
    /// `offset` is the number of parameters already rendered before
    /// `params`; placeholder indices continue from there.
    pub fn build(&self, params: &mut Vec<Value>, offset: usize) -> String {
        match self {
            Expr::Column { table, name } => {
                if let Some(t) = table {
                    format!("{}.{}", quote_identifier(t), quote_identifier(name))
                } else {
                    quote_identifier(name)
                }
            }

            Expr::Literal(value) => {
                params.push(value.clone());
                format!("${}", offset + params.len())
            }

            Expr::Binary { left, op, right } => {
                let left_sql = left.build(params, offset);
                let right_sql = right.build(params, offset);
                format!("{left_sql} {} {right_sql}", op.as_str())
            }

            Expr::Not(expr) => {
                let expr_sql = expr.build(params, offset);
                format!("NOT {expr_sql}")
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                let expr_sql = expr.build(params, offset);
                let value_sqls: Vec<_> =
                    values.iter().map(|v| v.build(params, offset)).collect();
                let not_str = if *negated { "NOT " } else { "" };
                format!("{expr_sql} {not_str}IN ({})", value_sqls.join(", "))
            }

            Expr::InTable { exprs, table } => {
                let expr_sqls: Vec<_> =
                    exprs.iter().map(|e| e.build(params, offset)).collect();
                format!("({}) IN {table}", expr_sqls.join(", "))
            }

            Expr::IsNull { expr, negated } => {
                let expr_sql = expr.build(params, offset);
                let not_str = if *negated { " NOT" } else { "" };
                format!("{expr_sql} IS{not_str} NULL")
            }

            Expr::Paren(expr) => {
                let expr_sql = expr.build(params, offset);
                format!("({expr_sql})")
            }

            Expr::CountStar => "COUNT(*)".to_string(),

            Expr::Raw(sql) => sql.clone(),
        }
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::Literal(Value::Bool(v))
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::Literal(Value::Int(v))
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::Literal(Value::BigInt(v))
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Literal(Value::Double(v))
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Expr::Literal(Value::Text(v.to_string()))
    }
}

impl From<String> for Expr {
    fn from(v: String) -> Self {
        Expr::Literal(Value::Text(v))
    }
}
