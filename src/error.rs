//! Error types for backup runs.

use thiserror::Error;

/// Result type alias using [`BackupError`].
pub type Result<T> = std::result::Result<T, BackupError>;

/// Errors that can occur during a backup run.
///
/// Some variants abort the run, others are collected per workflow and
/// reported at the end. See [`BackupError::is_fatal`].
#[derive(Debug, Error)]
pub enum BackupError {
    /// No token could be obtained, or ARM rejected it.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The identity is not allowed to read the site's publishing credentials.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// The Kudu directory listing failed.
    #[error("listing {path} failed: {message}")]
    Listing {
        /// VFS path that was listed
        path: String,
        /// What went wrong
        message: String,
    },

    /// A single workflow.json could not be downloaded.
    #[error("fetching workflow {workflow} failed: {message}")]
    Fetch {
        /// Workflow name
        workflow: String,
        /// What went wrong
        message: String,
    },

    /// A workflow.json was downloaded but is not a JSON object.
    #[error("workflow {workflow} is malformed: {message}")]
    MalformedWorkflow {
        /// Workflow name
        workflow: String,
        /// Parser message
        message: String,
    },

    /// The snapshot could not be written to Blob Storage.
    #[error("storage write failed: {0}")]
    StorageWrite(String),

    /// Missing or invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A site or folder name that is unsafe to splice into a URL path.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BackupError {
    /// Creates a listing error for a VFS path.
    pub fn listing(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Listing {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a fetch error for a workflow.
    pub fn fetch(workflow: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            workflow: workflow.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed-workflow error.
    ///
    /// # Example
    ///
    /// ```
    /// use logicapps_backup::BackupError;
    ///
    /// let err = BackupError::malformed("orders", "expected an object");
    /// assert_eq!(err.to_string(), "workflow orders is malformed: expected an object");
    /// assert!(!err.is_fatal());
    /// ```
    pub fn malformed(workflow: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedWorkflow {
            workflow: workflow.into(),
            message: message.into(),
        }
    }

    /// Returns `false` for errors that only affect one workflow.
    ///
    /// Everything else ends the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Fetch { .. } | Self::MalformedWorkflow { .. })
    }
}
