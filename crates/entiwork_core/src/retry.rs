//! Bounded retry for optimistic conflicts.

use crate::config::Config;
use crate::entity_store::{EntityStore, GuardedUnitOfWork};
use crate::error::CoreResult;
use crate::uow::UnitOfWork;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// How [`with_retry_policy`] repeats a conflicting operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A policy making `max_attempts` attempts with no pause.
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    /// Sets the pause between attempts.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// The policy described by a store configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_retry_attempts).with_backoff(config.retry_backoff)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Runs `operation` in a fresh guarded unit of work, retrying on conflict.
///
/// Each attempt opens a new unit of work named `usecase`, hands it to
/// `operation` and, if the operation succeeds, applies and commits it. The
/// operation must not finalize the unit of work itself.
///
/// Only [`CoreError::ConcurrentModification`](crate::CoreError::ConcurrentModification)
/// is retried, up to `max_attempts` attempts; after that the last conflict is
/// returned. Any other error is returned at once. A failed attempt's unit of
/// work is discarded.
///
/// # Errors
///
/// The operation's error, the error from applying or committing, or the last
/// conflict once attempts run out.
pub fn with_retry<T, F>(
    store: &EntityStore,
    max_attempts: u32,
    usecase: &str,
    operation: F,
) -> CoreResult<T>
where
    F: FnMut(&mut dyn UnitOfWork) -> CoreResult<T>,
{
    with_retry_policy(store, RetryPolicy::new(max_attempts), usecase, operation)
}

/// [`with_retry`] with an explicit [`RetryPolicy`].
///
/// # Errors
///
/// See [`with_retry`].
pub fn with_retry_policy<T, F>(
    store: &EntityStore,
    policy: RetryPolicy,
    usecase: &str,
    mut operation: F,
) -> CoreResult<T>
where
    F: FnMut(&mut dyn UnitOfWork) -> CoreResult<T>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        let mut uow = store.open_unit_of_work(usecase);
        match run_attempt(&mut uow, &mut operation) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                debug!(usecase, attempt, error = %e, "retrying unit of work");
                attempt += 1;
                if !policy.backoff.is_zero() {
                    thread::sleep(policy.backoff);
                }
            }
            Err(e) => {
                if e.is_retryable() {
                    info!(usecase, attempts, "retry attempts exhausted");
                }
                return Err(e);
            }
        }
    }
}

fn run_attempt<T, F>(uow: &mut GuardedUnitOfWork, operation: &mut F) -> CoreResult<T>
where
    F: FnMut(&mut dyn UnitOfWork) -> CoreResult<T>,
{
    let outcome = match operation(&mut *uow) {
        Ok(value) => uow.complete().map(|_| value),
        Err(e) => Err(e),
    };
    if outcome.is_err() {
        if let Err(e) = uow.discard() {
            debug!(uow = %uow.id(), error = %e, "failed attempt could not be discarded");
        }
    }
    outcome
}
