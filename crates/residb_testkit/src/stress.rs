//! Stress helpers for ResiDB.
//!
//! These run workloads from several threads against one store and report
//! throughput.

use crate::fixtures::{User, USER_TYPE};
use residb_core::{Collection, RecordId, Store};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
        }
    }
}

fn users(store: &Store) -> Collection<User> {
    store
        .collection::<User>()
        .expect("Failed to register User")
}

fn run_threads<F>(config: &StressConfig, op: F) -> StressTestResult
where
    F: Fn(usize, usize) -> bool + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let op = Arc::clone(&op);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let operations = config.operations;
            thread::spawn(move || {
                for i in 0..operations {
                    if op(t, i) {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Stress thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Every thread inserts distinct users. All inserts should succeed.
pub fn stress_concurrent_inserts(store: &Store, config: &StressConfig) -> StressTestResult {
    let users = users(store);
    run_threads(config, move |t, i| {
        let mut user = User::new(&format!("t{t}-u{i}"), (i % 90) as i64);
        users.insert(&mut user).is_ok()
    })
}

/// Every thread inserts the same usernames. Exactly one insert per name
/// should succeed.
pub fn stress_contended_inserts(store: &Store, config: &StressConfig) -> StressTestResult {
    let users = users(store);
    run_threads(config, move |_, i| {
        let mut user = User::new(&format!("shared{i}"), 1);
        users.insert(&mut user).is_ok()
    })
}

/// Mixed lookups, range scans and updates over `seed` existing users.
pub fn stress_mixed_operations(
    store: &Store,
    config: &StressConfig,
    seed: usize,
) -> StressTestResult {
    let users = users(store);
    let mut batch: Vec<User> = (0..seed)
        .map(|i| User::new(&format!("seed{i}"), (i % 90) as i64))
        .collect();
    users
        .insert_batch(&mut batch)
        .expect("Failed to seed users");
    let ids: Arc<Vec<RecordId>> = Arc::new(batch.iter().map(|u| u.id).collect());

    let store = store.clone();
    run_threads(config, move |t, i| {
        let id = ids[(t * 31 + i) % ids.len()];
        match i % 3 {
            0 => store.get(USER_TYPE, id).is_ok(),
            1 => store.range(USER_TYPE, "age", 10, 20).is_ok(),
            _ => match users.find_by_id(id) {
                Ok(Some(mut user)) => {
                    user.age = (user.age + 1) % 90;
                    users.update(&user).is_ok()
                }
                _ => false,
            },
        }
    })
}
