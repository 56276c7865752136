//! Pool settings

use crate::errors::{PoolError, PoolResult};
use std::fmt;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where and as whom to connect
///
/// The password is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

/// Settings bundle for a connection pool
///
/// # Examples
///
/// ```
/// use esox_dbpool::PoolSettings;
/// use std::time::Duration;
///
/// let settings = PoolSettings::new()
///     .with_host("db.internal")
///     .with_min_size(2)
///     .with_max_size(20)
///     .with_ttl(Duration::from_secs(100));
///
/// assert_eq!(settings.max_size, 20);
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolSettings {
    /// Database endpoint and credentials
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub endpoint: Endpoint,

    /// Connections opened eagerly when the pool is built
    pub min_size: usize,

    /// Upper bound on live connections, idle and leased together
    pub max_size: usize,

    /// Age after which a returned connection is closed instead of reused
    pub ttl: Duration,

    /// How long an acquire may wait for capacity
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            min_size: 1,
            max_size: 10,
            ttl: Duration::from_secs(3600),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolSettings {
    /// Create settings with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.endpoint.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.endpoint.port = port;
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.endpoint.database = database.into();
        self
    }

    /// Set user and password
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.endpoint.user = user.into();
        self.endpoint.password = password.into();
        self
    }

    pub fn with_min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set the time-to-live of a connection
    ///
    /// A zero TTL recycles every connection on its first release.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Check the size bounds
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_size == 0 {
            return Err(PoolError::InvalidConfig(
                "max_size must be at least 1".to_string(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(PoolError::InvalidConfig(format!(
                "min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PoolSettings::default().validate().is_ok());
    }

    #[test]
    fn test_min_above_max_rejected() {
        let settings = PoolSettings::new().with_min_size(5).with_max_size(2);
        assert!(matches!(
            settings.validate(),
            Err(PoolError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_max_rejected() {
        let settings = PoolSettings::new().with_min_size(0).with_max_size(0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let settings = PoolSettings::new().with_credentials("app", "hunter2");
        let printed = format!("{:?}", settings);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("app"));
    }
}
