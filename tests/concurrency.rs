use crossbeam::channel;
use esox_dbpool::testing::{MemoryConnection, MemoryConnector};
use esox_dbpool::{Connection, ConnectionPool, DriverError, PoolError, PoolSettings};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
enum AppError {
    Pool(PoolError),
    Db(DriverError),
}

impl From<PoolError> for AppError {
    fn from(err: PoolError) -> Self {
        AppError::Pool(err)
    }
}

impl From<DriverError> for AppError {
    fn from(err: DriverError) -> Self {
        AppError::Db(err)
    }
}

fn pool(min: usize, max: usize, timeout: Duration) -> (MemoryConnector, ConnectionPool<MemoryConnector>) {
    let connector = MemoryConnector::new();
    let settings = PoolSettings::new()
        .with_min_size(min)
        .with_max_size(max)
        .with_ttl(Duration::from_secs(3600))
        .with_acquire_timeout(timeout);
    let pool = ConnectionPool::new(connector.clone(), settings).unwrap();
    (connector, pool)
}

#[test]
fn test_bounds_and_exclusive_leases_under_load() {
    let (connector, pool) = pool(1, 4, Duration::from_secs(10));
    let held = Mutex::new(HashSet::new());
    let peak = AtomicUsize::new(0);

    crossbeam::scope(|s| {
        for _ in 0..16 {
            s.spawn(|_| {
                for i in 0..50 {
                    let result: Result<(), AppError> = pool.with_connection(|conn| {
                        assert!(held.lock().insert(conn.serial()), "connection leased twice");
                        peak.fetch_max(pool.active_count(), Ordering::SeqCst);
                        conn.execute("SELECT 1")?;
                        held.lock().remove(&conn.serial());
                        if i % 7 == 0 {
                            conn.execute("RAISE oops")?;
                        }
                        Ok(())
                    });
                    if let Err(AppError::Pool(err)) = result {
                        panic!("unexpected pool error: {err}");
                    }
                }
            });
        }
    })
    .unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 4);
    assert!(pool.active_count() <= 4);
    assert_eq!(connector.live(), pool.active_count());

    let metrics = pool.get_metrics();
    assert_eq!(metrics.leases_granted, 16 * 50);
    assert_eq!(
        metrics.leases_granted,
        metrics.leases_returned + metrics.failed_retirements + metrics.expired_retirements
    );
}

#[test]
fn test_third_caller_waits_for_release() {
    let (_connector, pool) = pool(2, 2, Duration::from_secs(5));

    let start = Instant::now();
    let first = pool.lease().unwrap();
    let second = pool.lease().unwrap();
    assert!(start.elapsed() < Duration::from_millis(500));
    let released_id = first.connection_id();

    let (tx, rx) = channel::bounded(1);
    crossbeam::scope(|s| {
        s.spawn(|_| {
            let lease = pool.lease().unwrap();
            tx.send(lease.connection_id()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(first);
        let got = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, released_id);
    })
    .unwrap();

    drop(second);
    assert_eq!(pool.idle_count(), 2);
}

#[test]
fn test_exhausted_pool_times_out() {
    let (_connector, pool) = pool(0, 1, Duration::from_millis(50));
    let _a = pool.lease().unwrap();

    let start = Instant::now();
    let result = pool.lease();
    let waited = start.elapsed();

    assert!(matches!(result, Err(PoolError::PoolExhaustedTimeout(_))));
    assert!(waited >= Duration::from_millis(50));
    assert!(waited < Duration::from_secs(2));
}

#[test]
fn test_panic_in_scope_retires_connection() {
    let (connector, pool) = pool(1, 1, Duration::from_secs(1));
    let calls = AtomicUsize::new(0);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let _: Result<(), AppError> = pool.with_connection(|conn: &mut MemoryConnection| {
            calls.fetch_add(1, Ordering::SeqCst);
            conn.execute("BEGIN").unwrap();
            panic!("caller bug");
        });
    }));

    assert!(outcome.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(pool.active_count(), 0);
    assert_eq!(connector.closed(), 1);
    assert_eq!(pool.get_metrics().failed_retirements, 1);

    let lease = pool.lease().unwrap();
    assert_eq!(connector.opened(), 2);
    drop(lease);
}

#[test]
fn test_failed_use_gets_fresh_connection_next() {
    let (connector, pool) = pool(1, 1, Duration::from_secs(1));

    let broken_serial = AtomicU64::new(0);
    let broken: Result<u64, AppError> = pool.with_connection(|conn| {
        broken_serial.store(conn.serial(), Ordering::SeqCst);
        conn.break_session();
        Ok(conn.execute("SELECT 1")?)
    });
    let broken_serial = broken_serial.load(Ordering::SeqCst);
    assert!(matches!(broken, Err(AppError::Db(_))));
    assert!(!connector.is_live(broken_serial));

    let next: Result<u64, AppError> = pool.with_connection(|conn| Ok(conn.serial()));
    assert_ne!(next.unwrap(), broken_serial);
}

#[test]
fn test_close_wakes_waiters() {
    let (_connector, pool) = pool(1, 1, Duration::from_secs(10));
    let held = pool.lease().unwrap();

    crossbeam::scope(|s| {
        let waiter = s.spawn(|_| {
            let start = Instant::now();
            let result = pool.lease();
            (result.map(|_| ()), start.elapsed())
        });

        std::thread::sleep(Duration::from_millis(50));
        pool.close();

        let (result, waited) = waiter.join().unwrap();
        assert!(matches!(result, Err(PoolError::Closed)));
        assert!(waited < Duration::from_secs(5));
    })
    .unwrap();

    drop(held);
    assert_eq!(pool.active_count(), 0);
}

#[test]
fn test_failed_open_does_not_consume_capacity() {
    let (connector, pool) = pool(0, 1, Duration::from_millis(100));
    connector.fail_next_opens(1);

    assert!(matches!(pool.lease(), Err(PoolError::ConnectFailed(_))));
    assert_eq!(pool.active_count(), 0);

    let lease = pool.lease().unwrap();
    assert_eq!(pool.active_count(), 1);
    drop(lease);
    assert_eq!(pool.get_metrics().connect_failures, 1);
}

#[test]
fn test_slow_open_does_not_block_release() {
    let (connector, pool) = pool(1, 2, Duration::from_secs(5));
    let held = pool.lease().unwrap();
    let held_id = held.connection_id();
    connector.set_open_delay(Duration::from_millis(500));

    crossbeam::scope(|s| {
        let grower = s.spawn(|_| pool.lease().map(|lease| lease.connection_id()));

        let deadline = Instant::now() + Duration::from_secs(2);
        while connector.open_attempts() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(connector.open_attempts(), 2);

        let start = Instant::now();
        drop(held);
        assert!(start.elapsed() < Duration::from_millis(100));

        let start = Instant::now();
        let reused = pool.lease_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(reused.connection_id(), held_id);
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(connector.opened(), 1);

        let grown_id = grower.join().unwrap().unwrap();
        assert_ne!(grown_id, held_id);
        assert_eq!(pool.active_count(), 2);
    })
    .unwrap();

    assert_eq!(pool.idle_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_async_acquire_does_not_leak() {
    let (_connector, pool) = pool(1, 1, Duration::from_secs(1));
    let held = pool.lease().unwrap();

    let attempt = tokio::time::timeout(
        Duration::from_millis(20),
        pool.lease_timeout_async(Duration::from_millis(500)),
    )
    .await;
    assert!(attempt.is_err());

    drop(held);

    let deadline = Instant::now() + Duration::from_secs(2);
    while pool.idle_count() != 1 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.active_count(), 1);

    let lease = pool.lease_async().await.unwrap();
    drop(lease);
}

#[tokio::test]
async fn test_concurrent_async_callers() {
    let (_connector, pool) = pool(2, 2, Duration::from_secs(5));

    let mut handles = vec![];
    for i in 0..6u64 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            pool.with_connection_async(move |conn| -> Result<u64, AppError> {
                std::thread::sleep(Duration::from_millis(10));
                Ok(conn.execute(&format!("UPDATE jobs SET done = true WHERE id = {i}"))?)
            })
            .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }
    assert_eq!(pool.active_count(), 2);
    assert_eq!(pool.idle_count(), 2);
}
