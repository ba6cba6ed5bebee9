//! Error types for the database multiplexer

use std::fmt;

/// Result type alias for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Errors delivered to the submitter of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    /// Opening a new connection failed
    ConnectFailed(String),

    /// The statement failed, the connection is still usable
    QueryFailed(String),

    /// The connection broke while the statement was running
    ConnectionLost(String),

    /// The pool went away before the query completed
    Closed,
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::ConnectFailed(msg) => write!(f, "failed to connect to database: {msg}"),
            DatabaseError::QueryFailed(msg) => write!(f, "query failed: {msg}"),
            DatabaseError::ConnectionLost(msg) => write!(f, "database connection lost: {msg}"),
            DatabaseError::Closed => write!(f, "database pool closed"),
        }
    }
}

impl std::error::Error for DatabaseError {}
