//! Kudu (SCM) virtual file system client.
//!
//! Only the two VFS reads the backup needs: listing a directory and
//! downloading a file, both under `api/vfs/site/wwwroot/`.

use crate::credentials::PublishingCredentials;
use crate::retry::RetryPolicy;
use crate::Result;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

/// VFS root all paths are relative to.
pub const VFS_ROOT: &str = "api/vfs/site/wwwroot";

/// MIME type Kudu reports for directories.
const DIRECTORY_MIME: &str = "inode/directory";

/// One entry of a VFS directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VfsEntry {
    /// File or directory name
    pub name: String,
    /// MIME type; `inode/directory` for directories
    #[serde(default)]
    pub mime: Option<String>,
}

impl VfsEntry {
    /// Returns true if the entry is a directory.
    pub fn is_directory(&self) -> bool {
        self.mime.as_deref() == Some(DIRECTORY_MIME)
    }
}

/// Outcome of a VFS read that did not fail at the transport level.
#[derive(Debug)]
pub enum VfsResponse<T> {
    /// 2xx with a body
    Found(T),
    /// 404
    NotFound,
    /// Any other status, after retries
    Failed(StatusCode),
}

/// Basic-authenticated client for one site's VFS.
pub struct KuduClient {
    client: reqwest::Client,
    retry: RetryPolicy,
    base_url: String,
    credentials: PublishingCredentials,
}

impl KuduClient {
    /// Creates a client for the SCM site at `base_url`.
    pub fn new(
        client: reqwest::Client,
        retry: RetryPolicy,
        base_url: impl Into<String>,
        credentials: PublishingCredentials,
    ) -> Self {
        Self {
            client,
            retry,
            base_url: base_url.into(),
            credentials,
        }
    }

    /// Full URL for a path relative to the VFS root.
    ///
    /// Directory paths must end with `/`; an empty path is the root itself.
    pub fn url_for(&self, relative: &str) -> String {
        format!("{}/{}/{}", self.base_url, VFS_ROOT, relative)
    }

    /// Lists a directory. `dir` is relative to the VFS root, empty for the
    /// root, and gets a trailing slash appended if missing.
    pub async fn list_dir(&self, dir: &str) -> Result<VfsResponse<Vec<VfsEntry>>> {
        let relative = if dir.is_empty() || dir.ends_with('/') {
            dir.to_string()
        } else {
            format!("{}/", dir)
        };

        match self.get(&relative).await? {
            VfsResponse::Found(resp) => Ok(VfsResponse::Found(resp.json().await?)),
            VfsResponse::NotFound => Ok(VfsResponse::NotFound),
            VfsResponse::Failed(status) => Ok(VfsResponse::Failed(status)),
        }
    }

    /// Downloads a file as text.
    pub async fn get_file(&self, file: &str) -> Result<VfsResponse<String>> {
        match self.get(file).await? {
            VfsResponse::Found(resp) => Ok(VfsResponse::Found(resp.text().await?)),
            VfsResponse::NotFound => Ok(VfsResponse::NotFound),
            VfsResponse::Failed(status) => Ok(VfsResponse::Failed(status)),
        }
    }

    async fn get(&self, relative: &str) -> Result<VfsResponse<reqwest::Response>> {
        let url = self.url_for(relative);
        let response = self
            .retry
            .send("kudu.vfs", || {
                self.client
                    .get(&url)
                    .basic_auth(&self.credentials.username, Some(self.credentials.password()))
            })
            .await?;

        let status = response.status();
        debug!(path = relative, status = %status, "vfs response received");

        Ok(if status.is_success() {
            VfsResponse::Found(response)
        } else if status == StatusCode::NOT_FOUND {
            VfsResponse::NotFound
        } else {
            VfsResponse::Failed(status)
        })
    }
}
