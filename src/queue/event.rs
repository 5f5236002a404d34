use serde::{Deserialize, Serialize};

/// Status of a queued event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueuedEventStatus {
    #[default]
    Pending,
    InFlight,
    Done,
    Failed,
}

impl QueuedEventStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueuedEventStatus::Done | QueuedEventStatus::Failed)
    }
}

/// A durable delivery record.
///
/// The payload is the bitcode-encoded job handed to the handler. Timestamps are
/// unix milliseconds taken from the queue's [`Clock`](crate::Clock).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub id: String,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub attempts: u32,
    pub status: QueuedEventStatus,
    pub next_attempt_at: u64,
    pub created_at: u64,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub leased_until: Option<u64>,
}

impl QueuedEvent {
    /// Create a pending record that is due immediately.
    pub fn create(event_type: impl Into<String>, payload: Vec<u8>, now: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            payload,
            attempts: 0,
            status: QueuedEventStatus::Pending,
            next_attempt_at: now,
            created_at: now,
            last_error: None,
            leased_until: None,
        }
    }

    /// Create a pending record with a bitcode-serialized payload.
    pub fn encode<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
        now: u64,
    ) -> Result<Self, bitcode::Error> {
        let bytes = bitcode::serialize(payload)?;
        Ok(Self::create(event_type, bytes, now))
    }

    /// Decode the payload from bitcode.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, bitcode::Error> {
        bitcode::deserialize(&self.payload)
    }

    pub fn is_pending(&self) -> bool {
        self.status == QueuedEventStatus::Pending
    }

    pub fn is_in_flight(&self) -> bool {
        self.status == QueuedEventStatus::InFlight
    }

    pub fn is_done(&self) -> bool {
        self.status == QueuedEventStatus::Done
    }

    pub fn is_failed(&self) -> bool {
        self.status == QueuedEventStatus::Failed
    }

    /// Whether an in-flight attempt outlived its lease without being checked off.
    pub fn lease_expired(&self, now: u64) -> bool {
        self.is_in_flight() && self.leased_until.map(|until| until <= now).unwrap_or(true)
    }

    // Transitions. Each returns whether it applied.

    pub fn claim(&mut self, now: u64, lease_ms: u64) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = QueuedEventStatus::InFlight;
        self.attempts = self.attempts.saturating_add(1);
        self.leased_until = Some(now.saturating_add(lease_ms));
        true
    }

    /// Restart the lease of the current attempt from `now`.
    pub fn renew_lease(&mut self, now: u64, lease_ms: u64) -> bool {
        if !self.is_in_flight() {
            return false;
        }
        self.leased_until = Some(now.saturating_add(lease_ms));
        true
    }

    pub fn complete(&mut self) -> bool {
        if !self.is_in_flight() {
            return false;
        }
        self.status = QueuedEventStatus::Done;
        self.leased_until = None;
        self.last_error = None;
        true
    }

    pub fn release(&mut self, next_attempt_at: u64, error: Option<String>) -> bool {
        if !self.is_in_flight() {
            return false;
        }
        self.status = QueuedEventStatus::Pending;
        self.next_attempt_at = next_attempt_at;
        self.leased_until = None;
        self.last_error = error;
        true
    }

    pub fn fail(&mut self, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = QueuedEventStatus::Failed;
        self.leased_until = None;
        if error.is_some() {
            self.last_error = error;
        }
        true
    }
}
