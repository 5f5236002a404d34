use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Wall-clock time in unix milliseconds, advanced by the tokio clock.
///
/// Queue records persist absolute timestamps, but scheduling has to follow
/// tokio's notion of time so that paused-time tests drive retries
/// deterministically. The clock anchors a wall-clock reading to a tokio
/// `Instant` once and derives every later reading from the tokio elapsed time.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    wall_anchor: u64,
    instant_anchor: Instant,
}

impl Clock {
    pub fn new() -> Self {
        let wall_anchor = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            wall_anchor,
            instant_anchor: Instant::now(),
        }
    }

    /// Current time in unix milliseconds.
    pub fn now_millis(&self) -> u64 {
        let elapsed = self.instant_anchor.elapsed().as_millis() as u64;
        self.wall_anchor.saturating_add(elapsed)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
