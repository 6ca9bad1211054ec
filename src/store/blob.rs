//! Azure Blob Storage snapshot store.
//!
//! Talks to the Blob service REST API directly with a bearer token from the
//! managed identity, so no storage keys or SAS tokens are configured.

use crate::retry::RetryPolicy;
use crate::store::SnapshotStore;
use crate::token::{TokenProvider, STORAGE_SCOPE};
use crate::{BackupError, Config, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Blob service REST version sent with every request.
const STORAGE_API_VERSION: &str = "2023-11-03";

/// Blob Storage snapshot store.
///
/// Creates the container on first write if it does not exist, then uploads
/// block blobs, which replaces any existing blob at the same path. A failed
/// container creation is retried on the next write and does not stop the
/// upload.
pub struct BlobSnapshotStore {
    client: reqwest::Client,
    retry: RetryPolicy,
    tokens: Arc<dyn TokenProvider>,
    account_url: String,
    container: String,
    container_ready: OnceCell<()>,
}

impl BlobSnapshotStore {
    /// Creates a store for the configured account and container.
    pub fn new(config: &Config, client: reqwest::Client, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client,
            retry: RetryPolicy::new(config.retry_max, config.retry_backoff),
            tokens,
            account_url: config.storage_account_url.clone(),
            container: config.container_name.clone(),
            container_ready: OnceCell::new(),
        }
    }

    fn container_url(&self) -> String {
        format!("{}/{}", self.account_url, self.container)
    }

    fn blob_url(&self, path: &str) -> String {
        format!("{}/{}", self.container_url(), path)
    }

    fn authorize(&self, request: RequestBuilder, token: &SecretString) -> RequestBuilder {
        request
            .bearer_auth(token.expose_secret())
            .header("x-ms-version", STORAGE_API_VERSION)
            .header("x-ms-date", http_date())
    }

    async fn token(&self) -> Result<SecretString> {
        self.tokens
            .token(STORAGE_SCOPE)
            .await
            .map_err(|e| BackupError::StorageWrite(format!("no storage token: {}", e)))
    }

    /// Creates the container; an existing container is fine.
    async fn ensure_container(&self, token: &SecretString) -> Result<()> {
        let url = format!("{}?restype=container", self.container_url());
        let response = self
            .retry
            .send("blob.create_container", || {
                self.authorize(self.client.put(&url), token)
                    .header(reqwest::header::CONTENT_LENGTH, "0")
            })
            .await
            .map_err(|e| BackupError::StorageWrite(format!("create container: {}", e)))?;

        match response.status() {
            StatusCode::CREATED => {
                info!(container = %self.container, "backup container created");
                Ok(())
            }
            StatusCode::CONFLICT => Ok(()),
            status => Err(BackupError::StorageWrite(format!(
                "create container {} returned {}",
                self.container, status
            ))),
        }
    }
}

#[async_trait]
impl SnapshotStore for BlobSnapshotStore {
    fn name(&self) -> &str {
        "blob"
    }

    async fn write(&self, path: &str, content: Vec<u8>) -> Result<()> {
        let token = self.token().await?;
        // A container-scoped role may upload but not create containers, so
        // only a failed upload fails the write.
        if let Err(e) = self
            .container_ready
            .get_or_try_init(|| self.ensure_container(&token))
            .await
        {
            debug!(error = %e, "container not ensured, uploading anyway");
        }

        let url = self.blob_url(path);
        let size = content.len();
        let response = self
            .retry
            .send("blob.put", || {
                self.authorize(self.client.put(&url), &token)
                    .header("x-ms-blob-type", "BlockBlob")
                    .header(CONTENT_TYPE, "application/json; charset=utf-8")
                    .body(content.clone())
            })
            .await
            .map_err(|e| BackupError::StorageWrite(format!("upload {}: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackupError::StorageWrite(format!(
                "upload {} returned {}",
                path, status
            )));
        }

        debug!(path, bytes = size, "snapshot uploaded");
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let token = self.token().await?;
        let url = self.blob_url(path);
        let response = self
            .retry
            .send("blob.get", || self.authorize(self.client.get(&url), &token))
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.bytes().await?.to_vec())),
            s => Err(BackupError::Other(anyhow::anyhow!(
                "read {} returned {}",
                path,
                s
            ))),
        }
    }
}

/// RFC 1123 date for the `x-ms-date` header.
fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
