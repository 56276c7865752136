//! # Esox DbPool
//!
//! Thread-safe client-side connection pool for relational databases, with
//! scoped leases, TTL recycling, async support, metrics and health reporting.
//!
//! ## Features
//!
//! - Eagerly opened minimum, on-demand growth up to a hard maximum
//! - Automatic release of leased connections via RAII (Drop trait)
//! - Failed leases close their connection instead of pooling it
//! - Connections past their time-to-live are recycled on release
//! - Waiters are woken on release, with capped backoff and a timeout
//! - Async leasing that never leaks a connection on cancellation
//! - Health monitoring and metrics, Prometheus export
//! - Pluggable driver through the [`Connector`] and [`Connection`] traits
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_dbpool::{Connection, ConnectionPool, PoolSettings};
//! use esox_dbpool::testing::MemoryConnector;
//! use std::time::Duration;
//!
//! let settings = PoolSettings::new()
//!     .with_min_size(2)
//!     .with_max_size(2)
//!     .with_ttl(Duration::from_secs(3600));
//! let pool = ConnectionPool::new(MemoryConnector::new(), settings).unwrap();
//!
//! {
//!     let mut conn = pool.lease().unwrap();
//!     conn.execute("SELECT 1").unwrap();
//!     // Connection automatically released when `conn` goes out of scope
//! }
//!
//! let committed = pool.with_connection(|conn| -> Result<(), Box<dyn std::error::Error>> {
//!     conn.execute("UPDATE todo SET done = true")?;
//!     conn.commit()?;
//!     Ok(())
//! });
//! assert!(committed.is_ok());
//! ```

mod backoff;
mod config;
mod driver;
mod errors;
mod eviction;
mod factory;
mod health;
mod metrics;
mod pool;
mod store;

pub mod testing;

pub use backoff::Backoff;
pub use config::{Endpoint, PoolSettings};
pub use driver::{Connection, Connector};
pub use errors::{DriverError, DriverErrorKind, PoolError, PoolResult};
pub use eviction::{ReleaseOutcome, RetireReason};
pub use health::HealthStatus;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use pool::{ConnectionPool, Lease};
