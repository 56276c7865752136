//! Pooled connection metadata and the recycling decision made on release

use std::fmt;
use std::time::{Duration, Instant};

/// How the caller's use of a leased connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Ok,
    Failed,
}

/// Why a connection was closed instead of being pooled again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireReason {
    /// Reached its time-to-live
    Expired,

    /// The lease ended in an error, so the session may be broken
    Failed,

    /// The pool is shutting down
    Draining,
}

impl fmt::Display for RetireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetireReason::Expired => "expired",
            RetireReason::Failed => "failed",
            RetireReason::Draining => "draining",
        };
        f.write_str(name)
    }
}

/// Where a released connection goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    ReturnIdle,
    Retire(RetireReason),
}

/// A raw connection plus the bookkeeping the pool needs
pub(crate) struct PooledConnection<C> {
    id: u64,
    raw: C,
    created_at: Instant,
    in_use: bool,
}

impl<C> PooledConnection<C> {
    pub fn new(id: u64, raw: C) -> Self {
        Self {
            id,
            raw,
            created_at: Instant::now(),
            in_use: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    pub fn set_in_use(&mut self, in_use: bool) {
        self.in_use = in_use;
    }

    /// Whether the connection is at or past the given TTL
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }

    pub fn raw(&self) -> &C {
        &self.raw
    }

    pub fn raw_mut(&mut self) -> &mut C {
        &mut self.raw
    }

    pub fn into_raw(self) -> C {
        self.raw
    }
}

impl<C> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("in_use", &self.in_use)
            .finish()
    }
}

/// Decide what happens to a connection coming back from a lease.
///
/// A failed lease always retires, before any age check. A successful one
/// retires once the connection has lived for `ttl` and otherwise goes back
/// to the idle set.
pub(crate) fn disposition<C>(
    conn: &PooledConnection<C>,
    outcome: ReleaseOutcome,
    ttl: Duration,
) -> Disposition {
    match outcome {
        ReleaseOutcome::Failed => Disposition::Retire(RetireReason::Failed),
        ReleaseOutcome::Ok if conn.is_expired(ttl) => Disposition::Retire(RetireReason::Expired),
        ReleaseOutcome::Ok => Disposition::ReturnIdle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_failed_always_retires() {
        let conn = PooledConnection::new(1, ());
        assert_eq!(
            disposition(&conn, ReleaseOutcome::Failed, HOUR),
            Disposition::Retire(RetireReason::Failed)
        );
    }

    #[test]
    fn test_fresh_connection_returns() {
        let conn = PooledConnection::new(1, ());
        assert_eq!(
            disposition(&conn, ReleaseOutcome::Ok, HOUR),
            Disposition::ReturnIdle
        );
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let conn = PooledConnection::new(1, ());
        assert_eq!(
            disposition(&conn, ReleaseOutcome::Ok, Duration::ZERO),
            Disposition::Retire(RetireReason::Expired)
        );
    }

    #[test]
    fn test_failed_retires_even_when_expired() {
        let conn = PooledConnection::new(1, ());
        assert_eq!(
            disposition(&conn, ReleaseOutcome::Failed, Duration::ZERO),
            Disposition::Retire(RetireReason::Failed)
        );
    }

    #[test]
    fn test_created_at_is_fixed() {
        let mut conn = PooledConnection::new(7, ());
        let created = conn.created_at();
        conn.set_in_use(true);
        conn.set_in_use(false);
        assert_eq!(conn.created_at(), created);
        assert!(!conn.is_in_use());
    }
}
