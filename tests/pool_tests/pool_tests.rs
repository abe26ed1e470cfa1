//! Tests for TaskPool and TaskHandle
//!
//! These tests verify:
//! - Results and errors flow back through handles
//! - A single worker runs jobs in submission order
//! - Panicking jobs surface as TaskAborted without killing the worker
//! - Dropping the pool drains queued work

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytevault::{TaskHandle, TaskPool, VaultError};

#[test]
fn test_submit_returns_result() {
    let pool = TaskPool::new("test", 2).unwrap();

    let handle = pool.submit(|| Ok(21 * 2));
    assert_eq!(handle.wait().unwrap(), 42);
}

#[test]
fn test_errors_propagate() {
    let pool = TaskPool::new("test", 1).unwrap();

    let handle: TaskHandle<()> = pool.submit(|| Err(VaultError::InvalidKey("k".to_string())));
    assert!(matches!(handle.wait(), Err(VaultError::InvalidKey(_))));
}

#[test]
fn test_single_worker_is_fifo() {
    let pool = TaskPool::bounded("fifo", 1, 4).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let order = Arc::clone(&order);
            pool.submit(move || {
                order.lock().unwrap().push(i);
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.wait().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), (0..50).collect::<Vec<_>>());
}

#[test]
fn test_panicking_job_reports_aborted() {
    let pool = TaskPool::new("panic", 1).unwrap();

    let failed: TaskHandle<()> = pool.submit(|| panic!("boom"));
    assert!(matches!(failed.wait(), Err(VaultError::TaskAborted)));

    // The worker is still alive
    assert_eq!(pool.submit(|| Ok("alive")).wait().unwrap(), "alive");
}

#[test]
fn test_ready_handle() {
    let handle = TaskHandle::ready(Ok(7));
    assert!(handle.is_finished());
    assert_eq!(handle.wait().unwrap(), 7);
}

#[test]
fn test_drop_drains_queue() {
    let counter = Arc::new(AtomicUsize::new(0));

    {
        let pool = TaskPool::new("drain", 2).unwrap();
        assert_eq!(pool.worker_count(), 2);
        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            // Handles are dropped immediately
            pool.submit(move || {
                thread::sleep(Duration::from_millis(1));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
    }

    assert_eq!(counter.load(Ordering::SeqCst), 20);
}
