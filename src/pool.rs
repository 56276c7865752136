//! Connection pool: the acquire/release protocol and scoped leases

use crate::backoff::Backoff;
use crate::config::PoolSettings;
use crate::driver::Connector;
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{self, Disposition, PooledConnection, ReleaseOutcome, RetireReason};
use crate::factory::ConnectionFactory;
use crate::health::HealthStatus;
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::store::PoolStore;

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A leased connection that is released when dropped
///
/// The lease records how the work went. Call [`mark_failed`](Self::mark_failed)
/// after an error so the connection is closed instead of reused. A lease
/// dropped while its thread is panicking counts as failed.
pub struct Lease<K: Connector> {
    conn: Option<PooledConnection<K::Connection>>,
    pool: ConnectionPool<K>,
    outcome: ReleaseOutcome,
}

impl<K: Connector> Lease<K> {
    fn new(conn: PooledConnection<K::Connection>, pool: ConnectionPool<K>) -> Self {
        Self {
            conn: Some(conn),
            pool,
            outcome: ReleaseOutcome::Ok,
        }
    }

    /// Close the connection on release instead of returning it
    pub fn mark_failed(&mut self) {
        self.outcome = ReleaseOutcome::Failed;
    }

    pub fn outcome(&self) -> ReleaseOutcome {
        self.outcome
    }

    /// Pool-unique id of the underlying connection
    pub fn connection_id(&self) -> u64 {
        self.pooled().id()
    }

    /// Time since the underlying connection was opened
    pub fn age(&self) -> Duration {
        self.pooled().age()
    }

    fn pooled(&self) -> &PooledConnection<K::Connection> {
        self.conn.as_ref().expect("lease already released")
    }
}

impl<K: Connector> Deref for Lease<K> {
    type Target = K::Connection;

    fn deref(&self) -> &Self::Target {
        self.pooled().raw()
    }
}

impl<K: Connector> DerefMut for Lease<K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("lease already released").raw_mut()
    }
}

impl<K: Connector> Drop for Lease<K> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let outcome = if std::thread::panicking() {
                ReleaseOutcome::Failed
            } else {
                self.outcome
            };
            self.pool.release(conn, outcome);
        }
    }
}

impl<K: Connector> fmt::Debug for Lease<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("connection", &self.conn)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Thread-safe pool of database connections
///
/// Cloning is cheap and every clone refers to the same pool. The pool keeps
/// between `min_size` and `max_size` live connections, recycles them once
/// they reach their TTL, and closes any connection whose lease failed.
///
/// # Examples
///
/// ```
/// use esox_dbpool::{Connection, ConnectionPool, PoolSettings};
/// use esox_dbpool::testing::MemoryConnector;
///
/// let settings = PoolSettings::new().with_min_size(1).with_max_size(4);
/// let pool = ConnectionPool::new(MemoryConnector::new(), settings).unwrap();
///
/// let rows = pool
///     .with_connection(|conn| -> Result<u64, Box<dyn std::error::Error>> {
///         let rows = conn.execute("INSERT INTO todo (name) VALUES ('List1')")?;
///         conn.commit()?;
///         Ok(rows)
///     })
///     .unwrap();
///
/// assert_eq!(rows, 1);
/// assert_eq!(pool.idle_count(), 1);
/// ```
pub struct ConnectionPool<K: Connector> {
    store: Arc<PoolStore<K>>,
    settings: Arc<PoolSettings>,
}

impl<K: Connector> Clone for ConnectionPool<K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<K: Connector> ConnectionPool<K> {
    /// Build a pool and open `min_size` connections up front
    ///
    /// Fails with `InvalidConfig` for inconsistent sizes and with
    /// `ConnectFailed` if any of the initial connections cannot be opened;
    /// the ones already opened are closed again.
    pub fn new(connector: K, settings: PoolSettings) -> PoolResult<Self> {
        settings.validate()?;

        let factory = ConnectionFactory::new(connector, settings.endpoint.clone());
        let store = Arc::new(PoolStore::new(factory, settings.max_size));

        if let Err(err) = store.warmup(settings.min_size) {
            store.drain_all();
            return Err(err);
        }

        info!(
            endpoint = %settings.endpoint,
            min_size = settings.min_size,
            max_size = settings.max_size,
            ttl = ?settings.ttl,
            "connection pool ready"
        );

        Ok(Self {
            store,
            settings: Arc::new(settings),
        })
    }

    /// Lease a connection, waiting up to the configured acquire timeout
    pub fn lease(&self) -> PoolResult<Lease<K>> {
        self.lease_timeout(self.settings.acquire_timeout)
    }

    /// Lease a connection, waiting up to `timeout`
    pub fn lease_timeout(&self, timeout: Duration) -> PoolResult<Lease<K>> {
        let conn = self.acquire(timeout)?;
        Ok(Lease::new(conn, self.clone()))
    }

    /// Run `f` with a leased connection
    ///
    /// The connection is released when `f` returns: back to the pool on
    /// `Ok`, closed on `Err` or panic. Pool errors are converted into `E`.
    pub fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut K::Connection) -> Result<T, E>,
        E: From<PoolError>,
    {
        let mut lease = self.lease()?;
        let result = f(&mut *lease);
        if result.is_err() {
            lease.mark_failed();
        }
        result
    }

    /// Lease a connection without blocking the async runtime
    ///
    /// The wait runs on the blocking pool. If this future is dropped before
    /// it completes, a lease obtained in the meantime is released rather
    /// than leaked.
    pub async fn lease_async(&self) -> PoolResult<Lease<K>> {
        self.lease_timeout_async(self.settings.acquire_timeout).await
    }

    pub async fn lease_timeout_async(&self, timeout: Duration) -> PoolResult<Lease<K>> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.lease_timeout(timeout))
            .await
            .map_err(|_| PoolError::Cancelled)?
    }

    /// Run `f` with a leased connection on the blocking pool
    ///
    /// Same release rules as [`with_connection`](Self::with_connection). A
    /// panic in `f` is resumed in the caller.
    pub async fn with_connection_async<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut K::Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<PoolError> + Send + 'static,
    {
        let pool = self.clone();
        match tokio::task::spawn_blocking(move || pool.with_connection(f)).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(E::from(PoolError::Cancelled)),
        }
    }

    /// Close idle connections and refuse further leases
    ///
    /// Outstanding leases keep working; their connections are closed when
    /// released. Waiting acquires fail with `Closed`. Returns the number of
    /// idle connections closed.
    pub fn close(&self) -> usize {
        self.store.drain_all()
    }

    pub fn is_closed(&self) -> bool {
        self.store.snapshot().2
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Connections waiting in the idle set
    pub fn idle_count(&self) -> usize {
        self.store.snapshot().0
    }

    /// Live connections, idle and leased together
    pub fn active_count(&self) -> usize {
        self.store.snapshot().1
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        let (idle, live, draining) = self.store.snapshot();
        HealthStatus::new(idle, live, self.store.max_size(), draining)
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        let (idle, live, _) = self.store.snapshot();
        self.store.metrics.get_metrics(live, idle, self.store.max_size())
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> Result<String, prometheus::Error> {
        crate::metrics::MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    /// Take an idle connection, open a new one, or wait for a release
    pub(crate) fn acquire(&self, timeout: Duration) -> PoolResult<PooledConnection<K::Connection>> {
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now + Duration::from_secs(86_400));
        let mut backoff = Backoff::default();

        loop {
            let conn = match self.store.try_take_idle()? {
                Some(conn) => Some(conn),
                None => self.store.try_grow()?,
            };

            if let Some(conn) = conn {
                MetricsTracker::incr(&self.store.metrics.leases_granted);
                debug!(connection_id = conn.id(), "leased connection");
                return Ok(conn);
            }

            match backoff.next_delay_until(deadline) {
                Some(delay) => self.store.wait_for_capacity(delay),
                None => {
                    MetricsTracker::incr(&self.store.metrics.acquire_timeouts);
                    debug!(?timeout, "timed out waiting for a connection");
                    return Err(PoolError::PoolExhaustedTimeout(timeout));
                }
            }
        }
    }

    /// Hand a leased connection back: pool it, or close it if it failed or aged out
    pub(crate) fn release(&self, conn: PooledConnection<K::Connection>, outcome: ReleaseOutcome) {
        let id = conn.id();
        match eviction::disposition(&conn, outcome, self.settings.ttl) {
            Disposition::ReturnIdle => match self.store.return_idle(conn) {
                Ok(()) => {
                    MetricsTracker::incr(&self.store.metrics.leases_returned);
                    debug!(connection_id = id, "returned connection");
                }
                Err(conn) => self.store.retire(conn, RetireReason::Draining),
            },
            Disposition::Retire(reason) => {
                debug!(connection_id = id, %reason, "retiring connection");
                self.store.retire(conn, reason);
            }
        }
    }
}
