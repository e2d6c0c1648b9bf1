//! Broker configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};

/// Tunables for call orchestration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Upper bound for a single media backend round trip; `0` waits forever
    pub backend_timeout_ms: u64,
    pub recording: RecordingConfig,
    pub notify: NotifyConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            backend_timeout_ms: 10_000,
            recording: RecordingConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl BrokerConfig {
    pub fn backend_timeout(&self) -> Option<Duration> {
        (self.backend_timeout_ms > 0).then(|| Duration::from_millis(self.backend_timeout_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.recording.uri_template.trim().is_empty() {
            return Err(BrokerError::config("recording.uri_template must not be empty"));
        }
        if self.notify.max_attempts == 0 {
            return Err(BrokerError::config("notify.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Which party's outbound stream is written to the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingSource {
    /// The party that answered the call
    Operator,
    /// The party that placed the call
    Caller,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Recorder location hint. Supports `{call_id}`, `{caller}`, `{operator}`
    /// and `{timestamp}` (unix seconds).
    pub uri_template: String,
    pub source: RecordingSource,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            uri_template: "file:///tmp/recordings/{call_id}_{timestamp}.webm".to_string(),
            source: RecordingSource::Operator,
        }
    }
}

impl RecordingConfig {
    /// Fill in the placeholders of `uri_template`
    pub fn render_uri(&self, call_id: &str, caller: &str, operator: &str, timestamp: i64) -> String {
        self.uri_template
            .replace("{call_id}", call_id)
            .replace("{caller}", caller)
            .replace("{operator}", operator)
            .replace("{timestamp}", &timestamp.to_string())
    }
}

/// Retry policy for recording-location notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub initial_backoff_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}
