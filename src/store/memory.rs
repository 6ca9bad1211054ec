//! In-memory snapshot store for testing.

use crate::store::SnapshotStore;
use crate::{BackupError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory snapshot store.
///
/// Keeps every written object in a map, with optional error injection for
/// simulating storage outages.
///
/// # Example
///
/// ```
/// use logicapps_backup::store::{MemorySnapshotStore, SnapshotStore};
///
/// #[tokio::main]
/// async fn main() -> logicapps_backup::Result<()> {
///     let store = MemorySnapshotStore::new();
///     store.write("site/latest.json", b"{}".to_vec()).await?;
///     assert_eq!(store.read("site/latest.json").await?, Some(b"{}".to_vec()));
///     assert_eq!(store.write_count().await, 1);
///     Ok(())
/// }
/// ```
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    writes: Arc<RwLock<usize>>,

    /// Error message to fail `write()` with
    pub write_error: Option<String>,
}

impl MemorySnapshotStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose writes always fail.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            write_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Number of successful writes so far.
    pub async fn write_count(&self) -> usize {
        *self.writes.read().await
    }

    /// Paths currently stored.
    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write(&self, path: &str, content: Vec<u8>) -> Result<()> {
        if let Some(ref message) = self.write_error {
            return Err(BackupError::StorageWrite(message.clone()));
        }

        self.objects.write().await.insert(path.to_string(), content);
        *self.writes.write().await += 1;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.read().await.get(path).cloned())
    }
}
