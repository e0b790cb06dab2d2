//! Remote upload boundary
//!
//! Records are uploaded one at a time as a JSON envelope. The envelope carries
//! an idempotency key derived from the installation's node id and the local
//! record id, so a record that is uploaded again after a lost acknowledgement
//! does not create a second copy on the server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::record::{InventoryRecord, RecordId};

/// Why a single upload did not succeed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server responded with status {0}")]
    Rejected(u16),

    #[error("Upload timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Could not encode record: {0}")]
    Encoding(String),
}

/// One record as sent to the remote service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEnvelope {
    pub idempotency_key: String,
    pub node_id: Uuid,
    pub record: InventoryRecord,
}

impl UploadEnvelope {
    pub fn new(node_id: Uuid, record: InventoryRecord) -> Self {
        Self {
            idempotency_key: idempotency_key(node_id, record.id),
            node_id,
            record,
        }
    }
}

pub fn idempotency_key(node_id: Uuid, id: RecordId) -> String {
    format!("{}:{}", node_id, id)
}

/// Sends a single record to the remote service
#[async_trait]
pub trait RemoteUploader: Send + Sync {
    async fn upload(&self, envelope: &UploadEnvelope) -> Result<(), UploadError>;
}

/// HTTP uploader configuration
#[derive(Debug, Clone)]
pub struct HttpUploaderConfig {
    /// Server base URL; records are posted to `{endpoint}/entries`
    pub endpoint: String,
    /// Transport-level timeout for a single request
    pub request_timeout: Duration,
}

/// Posts each record to the remote service over HTTP
pub struct HttpUploader {
    client: reqwest::Client,
    url: String,
    request_timeout: Duration,
}

impl HttpUploader {
    pub fn new(config: HttpUploaderConfig) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| UploadError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let url = format!("{}/entries", config.endpoint.trim_end_matches('/'));

        Ok(Self {
            client,
            url,
            request_timeout: config.request_timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RemoteUploader for HttpUploader {
    async fn upload(&self, envelope: &UploadEnvelope) -> Result<(), UploadError> {
        let response = self
            .client
            .post(&self.url)
            .header("Idempotency-Key", &envelope.idempotency_key)
            .json(envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UploadError::TimedOut(self.request_timeout)
                } else if e.is_builder() || e.is_body() {
                    UploadError::Encoding(e.to_string())
                } else {
                    UploadError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected(status.as_u16()));
        }

        tracing::debug!(
            record_id = %envelope.record.id,
            status = status.as_u16(),
            "Uploaded record"
        );

        Ok(())
    }
}

/// Accepts every upload after a simulated delay, without contacting anything.
pub struct DryRunUploader {
    latency: Duration,
}

impl DryRunUploader {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl RemoteUploader for DryRunUploader {
    async fn upload(&self, envelope: &UploadEnvelope) -> Result<(), UploadError> {
        tokio::time::sleep(self.latency).await;
        tracing::info!(
            record_id = %envelope.record.id,
            idempotency_key = %envelope.idempotency_key,
            "Dry run: record accepted without upload"
        );
        Ok(())
    }
}

/// Stands in when no endpoint is configured. Every upload fails, so records
/// stay unsynced.
pub struct UnconfiguredUploader;

#[async_trait]
impl RemoteUploader for UnconfiguredUploader {
    async fn upload(&self, _envelope: &UploadEnvelope) -> Result<(), UploadError> {
        Err(UploadError::Network("no sync endpoint configured".to_string()))
    }
}
