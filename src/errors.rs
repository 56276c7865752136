//! Error types for the connection pool

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Broad category of a driver failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The database could not be reached or the session broke
    Network,

    /// The server rejected the credentials
    Authentication,

    /// A statement or commit failed
    Query,

    /// The connection was already closed
    Closed,
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverErrorKind::Network => "network",
            DriverErrorKind::Authentication => "authentication",
            DriverErrorKind::Query => "query",
            DriverErrorKind::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Error raised by a database driver
///
/// # Examples
///
/// ```
/// use esox_dbpool::{DriverError, DriverErrorKind};
///
/// let err = DriverError::network("connection refused");
/// assert_eq!(err.kind(), DriverErrorKind::Network);
/// assert_eq!(err.to_string(), "network error: connection refused");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct DriverError {
    kind: DriverErrorKind,
    message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Network, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Authentication, message)
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Query, message)
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Closed, message)
    }

    pub fn kind(&self) -> DriverErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Failed to open a database connection: {0}")]
    ConnectFailed(#[source] DriverError),

    #[error("No connection became available within {0:?}")]
    PoolExhaustedTimeout(Duration),

    #[error("Pool is closed")]
    Closed,

    #[error("Invalid pool settings: {0}")]
    InvalidConfig(String),

    #[error("Operation was cancelled")]
    Cancelled,
}

pub type PoolResult<T> = Result<T, PoolError>;
