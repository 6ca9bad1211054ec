//! Discovery of candidate workflow folders.

use crate::kudu::{KuduClient, VfsEntry, VfsResponse};
use crate::validation::validate_folder_name;
use crate::{BackupError, Result};
use std::collections::HashSet;
use tracing::{info, warn};

/// Directory names whose children are workflow folders.
const NESTED_WORKFLOW_DIRS: [&str; 2] = ["Workflows", "workflows"];

/// A folder that may contain a `workflow.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkflowFolder {
    /// Workflow name (the folder's own name)
    pub name: String,
    /// Path relative to `site/wwwroot/`, e.g. `A` or `Workflows/C`
    pub path: String,
}

impl WorkflowFolder {
    /// Creates a folder at `path`, taking the name from its last segment.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Self { name, path }
    }

    /// True for folders under a `Workflows/` directory.
    pub fn is_nested(&self) -> bool {
        self.path.contains('/')
    }

    /// Path of the folder's `workflow.json`, relative to `site/wwwroot/`.
    pub fn definition_path(&self) -> String {
        format!("{}/workflow.json", self.path)
    }
}

/// Lists candidate workflow folders under `site/wwwroot/`.
///
/// Top-level directories are candidates, except `Workflows`/`workflows`,
/// whose child directories are candidates instead. The result is
/// deduplicated by path and sorted by name, with a top-level folder ahead
/// of a nested one of the same name. Name collisions are resolved after
/// fetching, since a top-level folder may turn out to have no
/// `workflow.json`.
///
/// # Errors
///
/// Returns [`BackupError::Listing`] if the root listing fails, or if a
/// nested workflows directory fails with anything other than 404.
pub async fn list_workflow_folders(kudu: &KuduClient) -> Result<Vec<WorkflowFolder>> {
    let root = match kudu.list_dir("").await {
        Ok(VfsResponse::Found(entries)) => entries,
        Ok(VfsResponse::NotFound) => {
            return Err(BackupError::listing("site/wwwroot/", "HTTP 404 Not Found"));
        }
        Ok(VfsResponse::Failed(status)) => {
            return Err(BackupError::listing("site/wwwroot/", format!("HTTP {}", status)));
        }
        Err(e) => return Err(BackupError::listing("site/wwwroot/", e.to_string())),
    };

    let mut top_level = Vec::new();
    let mut nested = Vec::new();

    for dir in directories(&root) {
        if NESTED_WORKFLOW_DIRS.contains(&dir.name.as_str()) {
            for child in list_nested(kudu, &dir.name).await? {
                nested.push(WorkflowFolder::new(format!("{}/{}", dir.name, child)));
            }
        } else {
            top_level.push(WorkflowFolder::new(dir.name.clone()));
        }
    }

    let mut seen = HashSet::new();
    let mut folders: Vec<WorkflowFolder> = top_level
        .into_iter()
        .chain(nested)
        .filter(|f| seen.insert(f.path.clone()))
        .collect();
    folders.sort_by(|a, b| (&a.name, a.is_nested()).cmp(&(&b.name, b.is_nested())));

    info!(count = folders.len(), "candidate workflow folders listed");
    Ok(folders)
}

async fn list_nested(kudu: &KuduClient, dir: &str) -> Result<Vec<String>> {
    let path = format!("site/wwwroot/{}/", dir);
    match kudu.list_dir(dir).await {
        Ok(VfsResponse::Found(entries)) => {
            Ok(directories(&entries).map(|e| e.name.clone()).collect())
        }
        Ok(VfsResponse::NotFound) => Ok(Vec::new()),
        Ok(VfsResponse::Failed(status)) => {
            Err(BackupError::listing(path, format!("HTTP {}", status)))
        }
        Err(e) => Err(BackupError::listing(path, e.to_string())),
    }
}

/// Directory entries with safe names.
fn directories(entries: &[VfsEntry]) -> impl Iterator<Item = &VfsEntry> {
    entries.iter().filter(|e| e.is_directory()).filter(|e| {
        match validate_folder_name(&e.name) {
            Ok(()) => true,
            Err(err) => {
                warn!(name = %e.name.escape_debug(), error = %err, "skipping directory");
                false
            }
        }
    })
}
