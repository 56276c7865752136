//! Health monitoring for connection pools

/// Health status of a connection pool
///
/// # Examples
///
/// ```
/// use esox_dbpool::{ConnectionPool, PoolSettings};
/// use esox_dbpool::testing::MemoryConnector;
///
/// let settings = PoolSettings::new().with_min_size(3).with_max_size(10);
/// let pool = ConnectionPool::new(MemoryConnector::new(), settings).unwrap();
///
/// let health = pool.get_health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_connections, 3);
/// ```
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Live connections over max size (0.0 to 1.0)
    pub utilization: f64,

    pub idle_connections: usize,

    pub live_connections: usize,

    pub max_size: usize,

    /// Whether the pool has been closed
    pub draining: bool,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    pub fn new(idle: usize, live: usize, max_size: usize, draining: bool) -> Self {
        let utilization = if max_size > 0 {
            live as f64 / max_size as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if draining {
            warnings.push("Pool is draining".to_string());
            is_healthy = false;
        }

        // Only a problem once every slot is leased out
        if utilization > 0.9 && idle == 0 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if idle == 0 && !draining {
            warnings.push("No idle connections".to_string());
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            idle_connections: idle,
            live_connections: live,
            max_size,
            draining,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
