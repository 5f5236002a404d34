use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::queue::QueueConfig;

/// Content of the placeholder issue opened for a reply whose annotation has
/// not been synchronized yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceholderConfig {
    pub title: String,
    pub body: String,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            title: "[docloop] Imported discussion".into(),
            body: "_This issue collects replies to an annotation that has not been imported yet._"
                .into(),
        }
    }
}

/// Engine configuration, usually read from JSON.
///
/// ```json
/// { "instanceName": "docloop", "queue": { "maxAttempts": 5 } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Adapter id upstream events must target to be accepted.
    pub adapter_id: String,
    /// Instance name shown in issue titles.
    pub instance_name: String,
    /// Instance homepage linked from every issue body.
    pub instance_home: String,
    pub placeholder: PlaceholderConfig,
    /// Issue label for endpoints that do not set their own.
    pub default_label: Option<String>,
    pub queue: QueueConfig,
    /// Minimum gap between the starts of two tracker calls for one endpoint.
    pub min_spacing_ms: u64,
    /// Lifetime of a cached repository listing.
    pub repositories_ttl_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            adapter_id: "github".into(),
            instance_name: "docloop".into(),
            instance_home: "https://docloop.net".into(),
            placeholder: PlaceholderConfig::default(),
            default_label: Some("docloop".into()),
            queue: QueueConfig::default(),
            min_spacing_ms: 0,
            repositories_ttl_ms: 2_000,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_adapter_id(mut self, adapter_id: impl Into<String>) -> Self {
        self.adapter_id = adapter_id.into();
        self
    }

    pub fn with_instance(mut self, name: impl Into<String>, home: impl Into<String>) -> Self {
        self.instance_name = name.into();
        self.instance_home = home.into();
        self
    }

    pub fn with_placeholder(mut self, title: impl Into<String>, body: impl Into<String>) -> Self {
        self.placeholder = PlaceholderConfig {
            title: title.into(),
            body: body.into(),
        };
        self
    }

    pub fn with_default_label(mut self, label: Option<String>) -> Self {
        self.default_label = label;
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_min_spacing(mut self, spacing: Duration) -> Self {
        self.min_spacing_ms = spacing.as_millis() as u64;
        self
    }

    pub fn with_repositories_ttl(mut self, ttl: Duration) -> Self {
        self.repositories_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }

    pub fn repositories_ttl(&self) -> Duration {
        Duration::from_millis(self.repositories_ttl_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adapter_id.trim().is_empty() {
            return Err(ConfigError::Invalid("adapterId must not be empty".into()));
        }
        if self.instance_name.trim().is_empty() {
            return Err(ConfigError::Invalid("instanceName must not be empty".into()));
        }
        if self.placeholder.title.trim().is_empty() {
            return Err(ConfigError::Invalid("placeholder title must not be empty".into()));
        }
        self.queue.validate()
    }
}
