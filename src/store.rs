//! Bounded store of idle connections and the live-connection count

use crate::driver::{Connection, Connector};
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{PooledConnection, RetireReason};
use crate::factory::ConnectionFactory;
use crate::metrics::MetricsTracker;

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

struct StoreState<C> {
    idle: VecDeque<PooledConnection<C>>,
    /// Idle, leased and in-creation connections
    active_count: usize,
    draining: bool,
}

/// Idle set plus bookkeeping, all behind one lock
///
/// The lock is only held for in-memory updates. Opening and closing
/// connections happens after it is released.
pub(crate) struct PoolStore<K: Connector> {
    state: Mutex<StoreState<K::Connection>>,
    available: Condvar,
    factory: ConnectionFactory<K>,
    max_size: usize,
    pub(crate) metrics: MetricsTracker,
}

impl<K: Connector> PoolStore<K> {
    pub fn new(factory: ConnectionFactory<K>, max_size: usize) -> Self {
        Self {
            state: Mutex::new(StoreState {
                idle: VecDeque::with_capacity(max_size),
                active_count: 0,
                draining: false,
            }),
            available: Condvar::new(),
            factory,
            max_size,
            metrics: MetricsTracker::new(),
        }
    }

    /// Open `count` connections and park them in the idle set
    pub fn warmup(&self, count: usize) -> PoolResult<()> {
        for _ in 0..count {
            match self.try_grow()? {
                Some(conn) => {
                    if let Err(conn) = self.return_idle(conn) {
                        self.retire(conn, RetireReason::Draining);
                    }
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Pop one idle connection without blocking
    pub fn try_take_idle(&self) -> PoolResult<Option<PooledConnection<K::Connection>>> {
        let mut state = self.state.lock();
        if state.draining {
            return Err(PoolError::Closed);
        }
        Ok(state.idle.pop_front().map(|mut conn| {
            conn.set_in_use(true);
            conn
        }))
    }

    /// Open a new connection if there is room under `max_size`
    ///
    /// `Ok(None)` means the pool is at capacity.
    pub fn try_grow(&self) -> PoolResult<Option<PooledConnection<K::Connection>>> {
        {
            let mut state = self.state.lock();
            if state.draining {
                return Err(PoolError::Closed);
            }
            if state.active_count >= self.max_size {
                return Ok(None);
            }
            state.active_count += 1;
        }

        let reservation = Reservation {
            store: self,
            held: true,
        };
        match self.factory.open() {
            Ok((id, raw)) => {
                reservation.keep();
                MetricsTracker::incr(&self.metrics.connections_created);
                let mut conn = PooledConnection::new(id, raw);
                conn.set_in_use(true);
                Ok(Some(conn))
            }
            Err(err) => {
                drop(reservation);
                MetricsTracker::incr(&self.metrics.connect_failures);
                Err(PoolError::ConnectFailed(err))
            }
        }
    }

    /// Put a leased connection back in the idle set
    ///
    /// Hands the connection back when the pool is draining so the caller
    /// can retire it instead.
    ///
    /// # Panics
    ///
    /// Panics if the connection is not marked in use, which means it was
    /// already returned.
    pub fn return_idle(
        &self,
        mut conn: PooledConnection<K::Connection>,
    ) -> Result<(), PooledConnection<K::Connection>> {
        assert!(conn.is_in_use(), "connection {} released twice", conn.id());
        let mut state = self.state.lock();
        if state.draining {
            return Err(conn);
        }
        conn.set_in_use(false);
        state.idle.push_back(conn);
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Close a connection and give its slot back
    pub fn retire(&self, conn: PooledConnection<K::Connection>, reason: RetireReason) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.active_count > 0, "retire with no live connections");
            state.active_count = state.active_count.saturating_sub(1);
        }
        self.available.notify_one();

        match reason {
            RetireReason::Expired => MetricsTracker::incr(&self.metrics.expired_retirements),
            RetireReason::Failed => MetricsTracker::incr(&self.metrics.failed_retirements),
            RetireReason::Draining => {}
        }
        self.close(conn, reason);
    }

    /// Close every idle connection and refuse new leases
    ///
    /// Leased connections stay counted until they come back, at which point
    /// they are retired. Returns how many idle connections were closed.
    pub fn drain_all(&self) -> usize {
        let (drained, already_draining) = {
            let mut state = self.state.lock();
            let already_draining = state.draining;
            state.draining = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.active_count -= drained.len();
            (drained, already_draining)
        };
        self.available.notify_all();

        if !already_draining {
            info!(
                endpoint = %self.factory.endpoint(),
                idle_closed = drained.len(),
                "draining connection pool"
            );
        }
        let count = drained.len();
        for conn in drained {
            self.close(conn, RetireReason::Draining);
        }
        count
    }

    /// Park the caller until capacity may have freed up, or `timeout` passes
    ///
    /// Returns immediately if an idle connection or a free slot is already
    /// there, so a release between the caller's last check and this call is
    /// not missed.
    pub fn wait_for_capacity(&self, timeout: Duration) {
        let mut state = self.state.lock();
        if state.draining || !state.idle.is_empty() || state.active_count < self.max_size {
            return;
        }
        let _ = self.available.wait_for(&mut state, timeout);
    }

    /// (idle, live, draining)
    pub fn snapshot(&self) -> (usize, usize, bool) {
        let state = self.state.lock();
        (state.idle.len(), state.active_count, state.draining)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn close(&self, conn: PooledConnection<K::Connection>, reason: RetireReason) {
        let id = conn.id();
        let age = conn.age();
        MetricsTracker::incr(&self.metrics.connections_retired);
        match conn.into_raw().close() {
            Ok(()) => debug!(connection_id = id, ?age, %reason, "closed connection"),
            Err(err) => warn!(connection_id = id, %reason, error = %err, "error closing connection"),
        }
    }
}

impl<K: Connector> Drop for PoolStore<K> {
    fn drop(&mut self) {
        self.drain_all();
    }
}

/// A slot counted in `active_count` before its connection exists
///
/// Dropping it without `keep` gives the slot back, including when the
/// factory unwinds.
struct Reservation<'a, K: Connector> {
    store: &'a PoolStore<K>,
    held: bool,
}

impl<K: Connector> Reservation<'_, K> {
    fn keep(mut self) {
        self.held = false;
    }
}

impl<K: Connector> Drop for Reservation<'_, K> {
    fn drop(&mut self) {
        if self.held {
            self.store.state.lock().active_count -= 1;
            self.store.available.notify_one();
        }
    }
}
