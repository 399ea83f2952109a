//! The `doctor` subcommand: probe the storage backend and publish the
//! engine's type bundle.

use std::io::Write;

use async_trait::async_trait;

use conductor_types::sanitize_error;

/// Identifier the engine's types are registered under.
pub const BUNDLE_ID: &str = "conductor.types.v1";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("cannot connect: {0}")]
    Connection(String),
    #[error("{0}")]
    Backend(String),
}

/// Contract to the storage backend; the backend itself is an external
/// collaborator.
#[async_trait]
pub trait StorageClient: Send + Sync {
    fn url(&self) -> &str;

    /// Probe liveness; returns a short status detail on success.
    async fn health_check(&self) -> Result<String, StorageError>;

    async fn publish_type_bundle(&self, bundle_id: &str) -> Result<(), StorageError>;
}

/// HTTP probe implementation of [`StorageClient`].
pub struct HttpStorageClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpStorageClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    fn url(&self) -> &str {
        &self.base_url
    }

    async fn health_check(&self) -> Result<String, StorageError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| StorageError::Connection(sanitize_error(&e.to_string())))?;
        if !response.status().is_success() {
            return Err(StorageError::Backend(format!(
                "health endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }
        let body = response.text().await.unwrap_or_default();
        let detail = body.trim();
        Ok(if detail.is_empty() {
            "ok".to_string()
        } else {
            detail.to_string()
        })
    }

    async fn publish_type_bundle(&self, bundle_id: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .put(format!("{}/types/{bundle_id}", self.base_url))
            .json(&serde_json::json!({ "bundle_id": bundle_id }))
            .send()
            .await
            .map_err(|e| StorageError::Connection(sanitize_error(&e.to_string())))?;
        if !response.status().is_success() {
            return Err(StorageError::Backend(format!(
                "type publication returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

/// Run the doctor checks, writing one line per step. Returns the process
/// exit code: 0 on full success, 1 on any failure.
pub async fn run_doctor(
    client: &dyn StorageClient,
    out: &mut dyn std::io::Write,
) -> std::io::Result<i32> {
    writeln!(out, "Storage URL: {}", client.url())?;

    match client.health_check().await {
        Ok(detail) => writeln!(out, "Storage health: OK ({detail})")?,
        Err(StorageError::Connection(reason)) => {
            writeln!(
                out,
                "Storage health: FAILED ({})\n\nTo start a local storage backend:\n  docker run -p 9009:9009 conductor/storage:latest",
                sanitize_error(&reason)
            )?;
            return Ok(1);
        }
        Err(error) => {
            writeln!(out, "Storage health: FAILED ({})", sanitize_error(&error.to_string()))?;
            return Ok(1);
        }
    }

    match client.publish_type_bundle(BUNDLE_ID).await {
        Ok(()) => writeln!(out, "Type bundle: OK ({BUNDLE_ID} registered)")?,
        Err(error) => {
            writeln!(out, "Type bundle: FAILED ({})", sanitize_error(&error.to_string()))?;
            return Ok(1);
        }
    }

    Ok(0)
}
