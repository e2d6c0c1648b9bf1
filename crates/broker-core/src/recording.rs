//! Recording-location notifications
//!
//! After a recorded call is torn down, the location of the finished recording is
//! handed to an external record store. Delivery runs on a detached task with
//! bounded retries so a slow or failing store never touches session state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::NotifyConfig;
use crate::error::NotifyError;

/// A finished recording and the pairing that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingNotice {
    pub caller: String,
    pub operator: String,
    pub location: String,
}

/// Sink for recording notices, typically an HTTP record store
#[async_trait]
pub trait RecordingNotifier: Send + Sync {
    async fn notify(&self, notice: &RecordingNotice) -> Result<(), NotifyError>;
}

/// Delivers notices to a [`RecordingNotifier`] with exponential backoff
#[derive(Clone)]
pub struct RecordingDispatcher {
    notifier: Arc<dyn RecordingNotifier>,
    policy: NotifyConfig,
}

impl RecordingDispatcher {
    pub fn new(notifier: Arc<dyn RecordingNotifier>, policy: NotifyConfig) -> Self {
        Self { notifier, policy }
    }

    /// Deliver `notice` in the background
    pub fn dispatch(&self, notice: RecordingNotice) -> JoinHandle<Result<(), NotifyError>> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let result = dispatcher.deliver(&notice).await;
            if let Err(e) = &result {
                warn!(
                    caller = %notice.caller,
                    operator = %notice.operator,
                    "Giving up on recording notification for {}: {}",
                    notice.location, e
                );
            }
            result
        })
    }

    /// Deliver `notice`, retrying until it succeeds or attempts run out
    pub async fn deliver(&self, notice: &RecordingNotice) -> Result<(), NotifyError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut backoff = Duration::from_millis(self.policy.initial_backoff_ms);
        let mut attempt = 1;

        loop {
            match self.notifier.notify(notice).await {
                Ok(()) => {
                    info!("Recording {} stored for operator {}", notice.location, notice.operator);
                    return Ok(());
                }
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    debug!(
                        "Recording notification attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, attempts, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }
}
