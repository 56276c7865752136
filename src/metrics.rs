//! Metrics collection and export for connection pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Point-in-time metrics for a pool
///
/// # Examples
///
/// ```
/// use esox_dbpool::{ConnectionPool, PoolSettings};
/// use esox_dbpool::testing::MemoryConnector;
///
/// let pool = ConnectionPool::new(MemoryConnector::new(), PoolSettings::new().with_min_size(2)).unwrap();
///
/// {
///     let _conn = pool.lease().unwrap();
///     let metrics = pool.get_metrics();
///     assert_eq!(metrics.leases_granted, 1);
///     assert_eq!(metrics.leased_connections, 1);
///     assert_eq!(metrics.live_connections, 2);
/// }
/// ```
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PoolMetrics {
    /// Connections opened over the pool's lifetime
    pub connections_created: usize,

    /// Connections closed over the pool's lifetime
    pub connections_retired: usize,

    /// Retirements caused by the TTL
    pub expired_retirements: usize,

    /// Retirements caused by a failed lease
    pub failed_retirements: usize,

    /// Successful acquires
    pub leases_granted: usize,

    /// Leases that went back to the idle set
    pub leases_returned: usize,

    /// Acquires that gave up waiting
    pub acquire_timeouts: usize,

    /// Factory failures
    pub connect_failures: usize,

    /// Idle plus leased connections
    pub live_connections: usize,

    /// Connections sitting in the idle set
    pub idle_connections: usize,

    /// Connections currently leased or being opened
    pub leased_connections: usize,

    /// Live connections over max size (0.0 to 1.0)
    pub utilization: f64,

    /// Configured upper bound
    pub max_size: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("connections_created".to_string(), self.connections_created.to_string());
        metrics.insert("connections_retired".to_string(), self.connections_retired.to_string());
        metrics.insert("expired_retirements".to_string(), self.expired_retirements.to_string());
        metrics.insert("failed_retirements".to_string(), self.failed_retirements.to_string());
        metrics.insert("leases_granted".to_string(), self.leases_granted.to_string());
        metrics.insert("leases_returned".to_string(), self.leases_returned.to_string());
        metrics.insert("acquire_timeouts".to_string(), self.acquire_timeouts.to_string());
        metrics.insert("connect_failures".to_string(), self.connect_failures.to_string());
        metrics.insert("live_connections".to_string(), self.live_connections.to_string());
        metrics.insert("idle_connections".to_string(), self.idle_connections.to_string());
        metrics.insert("leased_connections".to_string(), self.leased_connections.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("max_size".to_string(), self.max_size.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Render a snapshot in the Prometheus text exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_dbpool::{ConnectionPool, PoolSettings};
    /// use esox_dbpool::testing::MemoryConnector;
    /// use std::collections::HashMap;
    ///
    /// let pool = ConnectionPool::new(MemoryConnector::new(), PoolSettings::default()).unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("orders", Some(&tags)).unwrap();
    /// assert!(output.contains("dbpool_connections_live"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> Result<String, prometheus::Error> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }
        let opts = |name: &str, help: &str| Opts::new(name, help).const_labels(labels.clone());

        let registry = Registry::new();

        let gauges = [
            ("dbpool_connections_live", "Idle plus leased connections", metrics.live_connections),
            ("dbpool_connections_idle", "Connections in the idle set", metrics.idle_connections),
            ("dbpool_connections_leased", "Connections currently leased", metrics.leased_connections),
            ("dbpool_max_size", "Configured maximum pool size", metrics.max_size),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(opts(name, help))?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge))?;
        }

        let utilization = Gauge::with_opts(opts("dbpool_utilization", "Pool utilization ratio"))?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization))?;

        let counters = [
            ("dbpool_connections_created_total", "Connections opened", metrics.connections_created),
            ("dbpool_connections_retired_total", "Connections closed", metrics.connections_retired),
            ("dbpool_retired_expired_total", "Connections closed by TTL", metrics.expired_retirements),
            ("dbpool_retired_failed_total", "Connections closed after a failed lease", metrics.failed_retirements),
            ("dbpool_leases_granted_total", "Successful acquires", metrics.leases_granted),
            ("dbpool_leases_returned_total", "Leases returned to the idle set", metrics.leases_returned),
            ("dbpool_acquire_timeouts_total", "Acquires that timed out", metrics.acquire_timeouts),
            ("dbpool_connect_failures_total", "Failed connection opens", metrics.connect_failures),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(opts(name, help))?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub connections_created: AtomicUsize,
    pub connections_retired: AtomicUsize,
    pub expired_retirements: AtomicUsize,
    pub failed_retirements: AtomicUsize,
    pub leases_granted: AtomicUsize,
    pub leases_returned: AtomicUsize,
    pub acquire_timeouts: AtomicUsize,
    pub connect_failures: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, live: usize, idle: usize, max_size: usize) -> PoolMetrics {
        let utilization = if max_size > 0 {
            live as f64 / max_size as f64
        } else {
            0.0
        };

        PoolMetrics {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_retired: self.connections_retired.load(Ordering::Relaxed),
            expired_retirements: self.expired_retirements.load(Ordering::Relaxed),
            failed_retirements: self.failed_retirements.load(Ordering::Relaxed),
            leases_granted: self.leases_granted.load(Ordering::Relaxed),
            leases_returned: self.leases_returned.load(Ordering::Relaxed),
            acquire_timeouts: self.acquire_timeouts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            live_connections: live,
            idle_connections: idle,
            leased_connections: live.saturating_sub(idle),
            utilization,
            max_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_derives_leased() {
        let tracker = MetricsTracker::new();
        MetricsTracker::incr(&tracker.leases_granted);
        let metrics = tracker.get_metrics(4, 1, 8);
        assert_eq!(metrics.leased_connections, 3);
        assert_eq!(metrics.leases_granted, 1);
        assert!((metrics.utilization - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_export_has_every_field() {
        let exported = MetricsTracker::new().get_metrics(0, 0, 0).export();
        assert_eq!(exported.len(), 13);
        assert_eq!(exported["utilization"], "0.00");
    }
}
