//! Entity store configuration.

use std::time::Duration;

/// Configuration for an [`crate::EntityStore`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Attempts made by [`crate::EntityStore::with_retry`] before the last
    /// concurrent-modification error is surfaced.
    pub max_retry_attempts: u32,

    /// Pause between retry attempts (zero = retry immediately).
    pub retry_backoff: Duration,

    /// Whether the journalled store syncs the journal on every batch.
    pub sync_on_commit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_backoff: Duration::ZERO,
            sync_on_commit: true,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of retry attempts.
    #[must_use]
    pub const fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Sets the pause between retry attempts.
    #[must_use]
    pub const fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Sets whether the journal is synced on every batch.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }
}
