//! Stress tests for EntiWork.
//!
//! These drivers run many units of work against one store from several
//! threads and report how they fared.

use crate::fixtures::{counter_descriptor, seed_counter};
use entiwork_core::{
    with_retry, CoreError, CoreResult, EntityReference, EntityStore, UnitOfWork, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
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
    /// Attempts that hit a concurrent modification and were retried.
    pub conflicts: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, conflicts: usize, duration: Duration) -> Self {
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
            conflicts,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Conflicts retried: {}", self.conflicts);
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
    /// Number of distinct entities (for spread workloads).
    pub entity_count: usize,
    /// Retry attempts per operation.
    pub max_attempts: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 250,
            threads: 4,
            entity_count: 16,
            max_attempts: 64,
        }
    }
}

impl StressConfig {
    /// A configuration small enough for unit tests and doc examples.
    pub fn small() -> Self {
        Self {
            operations: 20,
            threads: 4,
            entity_count: 4,
            max_attempts: 64,
        }
    }
}

fn increment(uow: &mut dyn UnitOfWork, reference: &EntityReference) -> CoreResult<i64> {
    let state = uow.get_entity_state(reference)?;
    let next = state.property("count").and_then(Value::as_integer).unwrap_or(0) + 1;
    state.set_property("count", next)?;
    Ok(next)
}

fn run_threads<F>(config: &StressConfig, worker: F) -> StressTestResult
where
    F: Fn(usize, &AtomicUsize) -> (usize, usize) + Sync,
{
    let conflicts = AtomicUsize::new(0);
    let barrier = Barrier::new(config.threads);
    let start = Instant::now();

    let (successful, failed) = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|t| {
                let worker = &worker;
                let conflicts = &conflicts;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    worker(t, conflicts)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("Stress worker panicked"))
            .fold((0, 0), |(s, f), (ws, wf)| (s + ws, f + wf))
    });

    StressTestResult::new(
        successful,
        failed,
        conflicts.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Every thread increments the same counter through [`with_retry`].
///
/// With enough attempts no increment is lost: the counter ends at
/// `threads * operations` more than it started.
pub fn stress_contended_increments(
    store: &EntityStore,
    reference: &EntityReference,
    config: &StressConfig,
) -> StressTestResult {
    run_threads(config, |_, conflicts| {
        let mut successful = 0;
        let mut failed = 0;
        for _ in 0..config.operations {
            let mut attempts: usize = 0;
            let outcome = with_retry(store, config.max_attempts, "stress increment", |uow| {
                attempts += 1;
                increment(uow, reference)
            });
            conflicts.fetch_add(attempts.max(1) - 1, Ordering::Relaxed);
            match outcome {
                Ok(_) => successful += 1,
                Err(_) => failed += 1,
            }
        }
        (successful, failed)
    })
}

/// Every thread increments counters spread over `entity_count` entities,
/// without retrying. Conflicts are counted as failures.
pub fn stress_spread_increments(store: &EntityStore, config: &StressConfig) -> StressTestResult {
    let references: Vec<_> = (0..config.entity_count.max(1))
        .map(|i| seed_counter(store, &format!("stress:{i}")))
        .collect();

    run_threads(config, |t, conflicts| {
        let mut successful = 0;
        let mut failed = 0;
        for op in 0..config.operations {
            let reference = &references[(t * 7 + op) % references.len()];
            let mut uow = store.open_unit_of_work("spread increment");
            let outcome = increment(&mut uow, reference).and_then(|_| uow.complete());
            match outcome {
                Ok(_) => successful += 1,
                Err(e) => {
                    if matches!(e, CoreError::ConcurrentModification { .. }) {
                        conflicts.fetch_add(1, Ordering::Relaxed);
                    }
                    let _ = uow.discard();
                    failed += 1;
                }
            }
        }
        (successful, failed)
    })
}

/// Threads create distinct entities, each in its own unit of work.
pub fn stress_disjoint_creates(store: &EntityStore, config: &StressConfig) -> StressTestResult {
    let descriptor = counter_descriptor();
    run_threads(config, |t, _| {
        let mut successful = 0;
        let mut failed = 0;
        for op in 0..config.operations {
            let mut uow = store.open_unit_of_work("create");
            let reference = EntityReference::from(format!("created:{t}:{op}"));
            let outcome = uow
                .new_entity_state(reference, &descriptor)
                .map(|_| ())
                .and_then(|()| uow.complete().map(|_| ()));
            match outcome {
                Ok(()) => successful += 1,
                Err(_) => failed += 1,
            }
        }
        (successful, failed)
    })
}
