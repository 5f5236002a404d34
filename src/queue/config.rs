use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Retry and polling configuration of an [`EventQueue`](super::EventQueue).
///
/// All durations are milliseconds so the struct reads the same in JSON config
/// files as it does in code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueConfig {
    /// Delay after the n-th failed attempt is `delay[n-1]`; the last entry is
    /// reused for every attempt past the end of the list.
    pub delay: Vec<u64>,
    /// Lower bound for every computed delay.
    pub min_delay: u64,
    /// Attempts after which an event fails for good.
    pub max_attempts: u32,
    /// Poll period of the dispatch loop.
    pub process_interval: u64,
    /// Upper bound of the random jitter added to each delay.
    pub spread: u64,
    /// How long an attempt may stay in flight before it counts as unacknowledged.
    pub lease: u64,
    /// Keep `Done`/`Failed` records in the store instead of deleting them.
    pub retain_terminal: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            delay: vec![0, 1_000, 5_000],
            min_delay: 0,
            max_attempts: 3,
            process_interval: 10 * 60 * 1_000,
            spread: 100,
            lease: 60 * 1_000,
            retain_terminal: true,
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: impl Into<Vec<u64>>) -> Self {
        self.delay = delay.into();
        self
    }

    pub fn with_min_delay(mut self, min_delay: u64) -> Self {
        self.min_delay = min_delay;
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_process_interval(mut self, interval: Duration) -> Self {
        self.process_interval = interval.as_millis() as u64;
        self
    }

    pub fn with_spread(mut self, spread: u64) -> Self {
        self.spread = spread;
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease.as_millis() as u64;
        self
    }

    pub fn with_retain_terminal(mut self, retain: bool) -> Self {
        self.retain_terminal = retain;
        self
    }

    pub fn process_interval(&self) -> Duration {
        Duration::from_millis(self.process_interval)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delay.is_empty() {
            return Err(ConfigError::Invalid("queue delay schedule must not be empty".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("queue maxAttempts must be at least 1".into()));
        }
        if self.process_interval == 0 {
            return Err(ConfigError::Invalid("queue processInterval must be positive".into()));
        }
        if self.lease == 0 {
            return Err(ConfigError::Invalid("queue lease must be positive".into()));
        }
        Ok(())
    }

    /// Scheduled delay after `attempts` attempts, without jitter.
    pub fn base_delay(&self, attempts: u32) -> u64 {
        let index = (attempts.max(1) - 1) as usize;
        let scheduled = self
            .delay
            .get(index)
            .or_else(|| self.delay.last())
            .copied()
            .unwrap_or(0);
        scheduled.max(self.min_delay)
    }

    /// Scheduled delay after `attempts` attempts plus `0..=spread` jitter.
    pub fn retry_delay(&self, attempts: u32, rng: &mut impl Rng) -> u64 {
        let jitter = if self.spread == 0 {
            0
        } else {
            rng.gen_range(0..=self.spread)
        };
        self.base_delay(attempts).saturating_add(jitter)
    }
}
