//! Connection factory bound to a fixed endpoint

use crate::config::Endpoint;
use crate::driver::Connector;
use crate::errors::DriverError;

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Opens connections with the credentials captured at pool construction
///
/// No retries happen here; a failed open is handed straight back.
pub(crate) struct ConnectionFactory<K: Connector> {
    connector: K,
    endpoint: Endpoint,
    next_id: AtomicU64,
}

impl<K: Connector> ConnectionFactory<K> {
    pub fn new(connector: K, endpoint: Endpoint) -> Self {
        Self {
            connector,
            endpoint,
            next_id: AtomicU64::new(1),
        }
    }

    /// Open one raw connection, returning it with a pool-unique id
    pub fn open(&self) -> Result<(u64, K::Connection), DriverError> {
        match self.connector.open(&self.endpoint) {
            Ok(conn) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                debug!(connection_id = id, endpoint = %self.endpoint, "opened connection");
                Ok((id, conn))
            }
            Err(err) => {
                warn!(endpoint = %self.endpoint, error = %err, "failed to open connection");
                Err(err)
            }
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryConnector;

    #[test]
    fn test_ids_are_unique() {
        let factory = ConnectionFactory::new(MemoryConnector::new(), Endpoint::default());
        let (a, _) = factory.open().unwrap();
        let (b, _) = factory.open().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_failure_is_surfaced() {
        let connector = MemoryConnector::new();
        connector.fail_next_opens(1);
        let factory = ConnectionFactory::new(connector.clone(), Endpoint::default());

        assert!(factory.open().is_err());
        assert!(factory.open().is_ok());
        assert_eq!(connector.open_attempts(), 2);
    }
}
