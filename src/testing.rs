//! In-memory driver for tests and demos
//!
//! [`MemoryConnector`] hands out [`MemoryConnection`]s that never touch the
//! network. Failures can be injected on open, on close, and per statement.

use crate::config::Endpoint;
use crate::driver::{Connection, Connector};
use crate::errors::DriverError;

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct MemoryState {
    open_attempts: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    pending_open_failures: AtomicUsize,
    successes_before_failure: AtomicUsize,
    fail_closes: AtomicBool,
    next_serial: AtomicU64,
    open_delay: Mutex<Duration>,
    live: Mutex<HashSet<u64>>,
}

/// Connector whose sessions live in memory
///
/// Clones share counters, so a test can keep a handle after giving one to
/// the pool.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<MemoryState>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` opens fail with a network error
    pub fn fail_next_opens(&self, count: usize) {
        self.state.pending_open_failures.store(count, Ordering::SeqCst);
    }

    /// Let `successes` opens through, then fail the following `failures`
    pub fn fail_opens_after(&self, successes: usize, failures: usize) {
        self.state.successes_before_failure.store(successes, Ordering::SeqCst);
        self.state.pending_open_failures.store(failures, Ordering::SeqCst);
    }

    /// Make every close report an error (the session is still gone)
    pub fn fail_closes(&self, fail: bool) {
        self.state.fail_closes.store(fail, Ordering::SeqCst);
    }

    /// Sleep this long inside every open
    pub fn set_open_delay(&self, delay: Duration) {
        *self.state.open_delay.lock() = delay;
    }

    pub fn open_attempts(&self) -> usize {
        self.state.open_attempts.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet closed
    pub fn live(&self) -> usize {
        self.state.live.lock().len()
    }

    pub fn is_live(&self, serial: u64) -> bool {
        self.state.live.lock().contains(&serial)
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    fn open(&self, endpoint: &Endpoint) -> Result<MemoryConnection, DriverError> {
        self.state.open_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.open_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let skip = self
            .state
            .successes_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let should_fail = !skip
            && self
                .state
                .pending_open_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if should_fail {
            return Err(DriverError::network(format!(
                "could not connect to {}:{}",
                endpoint.host, endpoint.port
            )));
        }

        let serial = self.state.next_serial.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        self.state.live.lock().insert(serial);
        Ok(MemoryConnection {
            serial,
            state: Arc::clone(&self.state),
            broken: false,
            executed: Vec::new(),
            commits: 0,
        })
    }
}

/// Session produced by [`MemoryConnector`]
///
/// Statements starting with `RAISE` fail with a query error. After
/// [`break_session`](Self::break_session) every call fails with a network
/// error.
pub struct MemoryConnection {
    serial: u64,
    state: Arc<MemoryState>,
    broken: bool,
    executed: Vec<String>,
    commits: usize,
}

impl MemoryConnection {
    /// Connector-wide unique number of this session
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn break_session(&mut self) {
        self.broken = true;
    }

    fn check_alive(&self) -> Result<(), DriverError> {
        if self.broken {
            return Err(DriverError::network("server closed the connection unexpectedly"));
        }
        Ok(())
    }
}

impl Connection for MemoryConnection {
    fn execute(&mut self, statement: &str) -> Result<u64, DriverError> {
        self.check_alive()?;
        if statement.trim_start().starts_with("RAISE") {
            return Err(DriverError::query(format!("statement failed: {statement}")));
        }
        self.executed.push(statement.to_string());
        Ok(1)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.check_alive()?;
        self.commits += 1;
        Ok(())
    }

    fn close(self) -> Result<(), DriverError> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        self.state.live.lock().remove(&self.serial);
        if self.state.fail_closes.load(Ordering::SeqCst) {
            return Err(DriverError::closed("connection already terminated"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_close_tracked() {
        let connector = MemoryConnector::new();
        let conn = connector.open(&Endpoint::default()).unwrap();
        let serial = conn.serial();
        assert!(connector.is_live(serial));

        conn.close().unwrap();
        assert!(!connector.is_live(serial));
        assert_eq!(connector.closed(), 1);
    }

    #[test]
    fn test_broken_session_fails() {
        let connector = MemoryConnector::new();
        let mut conn = connector.open(&Endpoint::default()).unwrap();
        assert_eq!(conn.execute("SELECT 1").unwrap(), 1);
        conn.break_session();
        assert!(conn.execute("SELECT 1").is_err());
        assert!(conn.commit().is_err());
    }

    #[test]
    fn test_raise_statement_fails() {
        let connector = MemoryConnector::new();
        let mut conn = connector.open(&Endpoint::default()).unwrap();
        let err = conn.execute("RAISE boom").unwrap_err();
        assert_eq!(err.kind(), crate::errors::DriverErrorKind::Query);
        assert!(conn.executed().is_empty());
    }
}
