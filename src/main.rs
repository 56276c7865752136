// Esox DbPool
// Thread-safe database connection pool with scoped leases
//
// This is just a binary wrapper - the actual library is in lib.rs. It runs
// the pool against the in-memory driver. Set RUST_LOG=esox_dbpool=debug to
// watch leases and retirements.

use esox_dbpool::testing::MemoryConnector;
use esox_dbpool::{Connection, ConnectionPool, DriverError, PoolError, PoolSettings};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum DemoError {
    Pool(PoolError),
    Db(DriverError),
}

impl fmt::Display for DemoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemoError::Pool(err) => write!(f, "pool: {err}"),
            DemoError::Db(err) => write!(f, "database: {err}"),
        }
    }
}

impl From<PoolError> for DemoError {
    fn from(err: PoolError) -> Self {
        DemoError::Pool(err)
    }
}

impl From<DriverError> for DemoError {
    fn from(err: DriverError) -> Self {
        DemoError::Db(err)
    }
}

fn create_todo(pool: &ConnectionPool<MemoryConnector>, name: &str) -> Result<u64, DemoError> {
    pool.with_connection(|conn| {
        let rows = conn.execute(&format!(
            "INSERT INTO todolist_todolist (name, description) VALUES ('{name}', 'About');"
        ))?;
        conn.commit()?;
        Ok(rows)
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Esox DbPool ===");

    let settings = PoolSettings::new()
        .with_database("ToDoDatabase")
        .with_min_size(1)
        .with_max_size(4)
        .with_ttl(Duration::from_secs(100))
        .with_acquire_timeout(Duration::from_secs(2));

    let pool = match ConnectionPool::new(MemoryConnector::new(), settings) {
        Ok(pool) => Arc::new(pool),
        Err(err) => {
            eprintln!("could not start pool: {err}");
            std::process::exit(1);
        }
    };

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for i in 0..25 {
                    if let Err(err) = create_todo(&pool, &format!("List{worker}-{i}")) {
                        eprintln!("worker {worker}: {err}");
                    }
                }
            })
        })
        .collect();
    for (worker, handle) in workers.into_iter().enumerate() {
        if handle.join().is_err() {
            eprintln!("worker {worker} panicked");
        }
    }

    let failed: Result<u64, DemoError> = pool.with_connection(|conn| Ok(conn.execute("RAISE broken")?));
    if let Err(err) = failed {
        println!("  Failed statement retired its connection: {err}");
    }

    let metrics = pool.get_metrics();
    println!("  Leases granted:      {}", metrics.leases_granted);
    println!("  Connections created: {}", metrics.connections_created);
    println!("  Connections retired: {}", metrics.connections_retired);
    println!("  Live / max:          {} / {}", metrics.live_connections, metrics.max_size);

    pool.close();
}
