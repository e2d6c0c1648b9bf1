//! HTTP client for the external record store
//!
//! Finished recordings are bound to their pairing by POSTing
//! `{"user_id", "admin_id", "filename"}` to `{base}/video/save`. The store
//! answers `201 Created` on success; any other status is a rejection.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use callbroker_core::{NotifyError, RecordingNotice, RecordingNotifier};

use crate::error::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SaveVideoRequest {
    user_id: Value,
    admin_id: Value,
    filename: String,
}

impl SaveVideoRequest {
    fn from_notice(notice: &RecordingNotice) -> Self {
        Self {
            user_id: identity_value(&notice.caller),
            admin_id: identity_value(&notice.operator),
            filename: notice.location.clone(),
        }
    }
}

/// Numeric identities are sent as JSON numbers, anything else as a string
fn identity_value(identity: &str) -> Value {
    identity
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(identity.to_string()))
}

#[derive(Debug, Clone)]
pub struct HttpRecordStore {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRecordStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/video/save", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RecordingNotifier for HttpRecordStore {
    async fn notify(&self, notice: &RecordingNotice) -> std::result::Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SaveVideoRequest::from_notice(notice))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        debug!("Record store answered {} for {}", status, notice.location);
        if status == StatusCode::CREATED {
            Ok(())
        } else {
            Err(NotifyError::Rejected(status.as_u16()))
        }
    }
}
