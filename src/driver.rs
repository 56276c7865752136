//! Database driver boundary
//!
//! The pool never speaks a wire protocol itself. A driver plugs in by
//! implementing [`Connector`] for opening sessions and [`Connection`] for
//! the session it hands back.

use crate::config::Endpoint;
use crate::errors::DriverError;

/// A live database session
pub trait Connection: Send + 'static {
    /// Run a statement, returning the number of affected rows
    fn execute(&mut self, statement: &str) -> Result<u64, DriverError>;

    /// Commit the current transaction
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Close the session
    fn close(self) -> Result<(), DriverError>;
}

/// Opens raw sessions against an endpoint
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    fn open(&self, endpoint: &Endpoint) -> Result<Self::Connection, DriverError>;
}
