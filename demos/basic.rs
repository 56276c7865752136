//! Basic usage examples for ConnectionPool

use esox_dbpool::testing::MemoryConnector;
use esox_dbpool::{Connection, ConnectionPool, PoolSettings};
use std::time::Duration;

fn main() {
    println!("=== Esox DbPool - Basic Examples ===\n");

    // Example 1: Scoped lease
    scoped_lease();

    // Example 2: Failed work retires the connection
    failed_work();

    // Example 3: Exhaustion and timeout
    exhaustion();

    // Example 4: Metrics and health
    metrics_and_health();
}

fn settings() -> PoolSettings {
    PoolSettings::new()
        .with_host("localhost")
        .with_database("ToDoDatabase")
        .with_credentials("postgres", "secret")
}

fn scoped_lease() {
    println!("1. Scoped Lease:");
    let pool = ConnectionPool::new(MemoryConnector::new(), settings().with_min_size(1)).unwrap();

    {
        let mut conn = pool.lease().unwrap();
        conn.execute("INSERT INTO todolist_todolist (name) VALUES ('List1')").unwrap();
        conn.commit().unwrap();
        println!("   Leased connection #{}", conn.connection_id());
        // Connection automatically returned when dropped
    }

    println!("   Idle after return: {}\n", pool.idle_count());
}

fn failed_work() {
    println!("2. Failed Work:");
    let pool = ConnectionPool::new(MemoryConnector::new(), settings().with_min_size(1)).unwrap();

    let result = pool.with_connection(|conn| -> Result<u64, Box<dyn std::error::Error>> {
        Ok(conn.execute("RAISE division by zero")?)
    });
    println!("   Result: {:?}", result.map_err(|e| e.to_string()));
    println!("   Live connections after failure: {}\n", pool.active_count());
}

fn exhaustion() {
    println!("3. Exhaustion:");
    let pool = ConnectionPool::new(
        MemoryConnector::new(),
        settings().with_min_size(1).with_max_size(1),
    )
    .unwrap();

    let held = pool.lease().unwrap();
    match pool.lease_timeout(Duration::from_millis(50)) {
        Ok(_) => println!("   Got a second connection"),
        Err(e) => println!("   Error: {}", e),
    }
    drop(held);

    let again = pool.lease_timeout(Duration::from_millis(50));
    println!("   After release: {}\n", if again.is_ok() { "Success" } else { "Failed" });
}

fn metrics_and_health() {
    println!("4. Metrics and Health:");
    let pool = ConnectionPool::new(
        MemoryConnector::new(),
        settings().with_min_size(2).with_max_size(5),
    )
    .unwrap();

    {
        let _conn1 = pool.lease().unwrap();
        let _conn2 = pool.lease().unwrap();

        let health = pool.get_health_status();
        println!("   Health: {}", if health.is_healthy { "Healthy" } else { "Unhealthy" });
        println!("   Utilization: {:.1}%", health.utilization * 100.0);
        println!("   Live: {}, Idle: {}", health.live_connections, health.idle_connections);
    }

    let metrics = pool.export_metrics();
    println!("\n   Metrics:");
    for (key, value) in metrics {
        println!("     {}: {}", key, value);
    }
}
