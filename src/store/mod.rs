//! Persistence of backup snapshots.
//!
//! This module defines the [`SnapshotStore`] trait, the narrow interface the
//! pipeline uses to write (and read back) the single latest snapshot.
//!
//! # Implementations
//!
//! - [`BlobSnapshotStore`]: Azure Blob Storage, authenticated with the
//!   managed identity
//! - [`MemorySnapshotStore`]: in-memory, with error injection (`mock` feature)

mod blob;
#[cfg(feature = "mock")]
mod memory;

pub use blob::BlobSnapshotStore;
#[cfg(feature = "mock")]
pub use memory::MemorySnapshotStore;

use crate::Result;
use async_trait::async_trait;

/// Storage for the latest backup snapshot.
///
/// Writes always replace the whole object at `path`; there is no patching
/// and no version history.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns the store name (e.g. "blob", "memory").
    fn name(&self) -> &str;

    /// Writes `content` at `path`, overwriting whatever is there.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::StorageWrite`](crate::BackupError::StorageWrite)
    /// if the write cannot be completed.
    async fn write(&self, path: &str, content: Vec<u8>) -> Result<()>;

    /// Reads the object at `path`, or `None` if it does not exist.
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;
}
