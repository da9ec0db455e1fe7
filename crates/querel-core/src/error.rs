//! Error types for querel operations.

use std::fmt;

/// The primary error type for all querel operations.
#[derive(Debug)]
pub enum Error {
    /// Schema-resolution errors (unknown table, missing primary key,
    /// missing or ambiguous foreign key)
    Schema(SchemaError),
    /// Errors reported by the statement execution engine, passed through
    /// unchanged
    Query(QueryError),
    /// Type conversion errors while decoding row values
    Type(TypeError),
    /// Internal contract violation: a bug in the caller's query or
    /// association construction, not a recoverable data condition
    Invariant(String),
    /// The requested statement shape is not expressible for this relation
    /// (e.g. UPDATE against a join-backed relation)
    Unsupported(String),
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Custom error with message
    Custom(String),
}

/// Schema-resolution failure detail.
#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub table: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Table is not known to the schema
    UnknownTable,
    /// Table has no primary key declared
    MissingPrimaryKey,
    /// No foreign key constraint matches the requested association
    MissingForeignKey,
    /// Multiple candidate foreign keys and no disambiguating hint
    AmbiguousForeignKey,
}

/// Error reported by the statement execution engine.
///
/// Constraint violations, malformed SQL, connection failures: this layer
/// adds no retry policy and carries them through unchanged.
#[derive(Debug)]
pub struct QueryError {
    pub message: String,
    pub sql: Option<String>,
}

/// Type conversion failure while decoding a row value.
#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl SchemaError {
    /// Create a schema error for a table.
    #[must_use]
    pub fn new(kind: SchemaErrorKind, table: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            message: message.into(),
        }
    }
}

impl QueryError {
    /// Create an execution-engine error, optionally carrying the SQL text.
    #[must_use]
    pub fn new(message: impl Into<String>, sql: Option<String>) -> Self {
        Self {
            message: message.into(),
            sql,
        }
    }
}

impl Error {
    /// Is this an internal contract violation (caller bug)?
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Error::Invariant(_))
    }

    /// Is this a schema-resolution error?
    #[must_use]
    pub fn is_schema_error(&self) -> bool {
        matches!(self, Error::Schema(_))
    }

    /// Get the SQL that caused this error, if available.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Schema(e) => write!(f, "Schema error: {}", e),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Invariant(msg) => write!(f, "Internal invariant violated: {}", msg),
            Error::Unsupported(msg) => write!(f, "Unsupported operation: {}", msg),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table '{}': {}", self.table, self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sql) = &self.sql {
            write!(f, "{} (sql: {})", self.message, sql)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<SchemaError> for Error {
    fn from(e: SchemaError) -> Self {
        Error::Schema(e)
    }
}

impl From<QueryError> for Error {
    fn from(e: QueryError) -> Self {
        Error::Query(e)
    }
}

impl From<TypeError> for Error {
    fn from(e: TypeError) -> Self {
        Error::Type(e)
    }
}

/// Convenience result type for querel operations.
pub type Result<T> = std::result::Result<T, Error>;
