//! Workflow entries and the persisted backup snapshot.

use crate::masker::SecretMasker;
use crate::BackupError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A downloaded workflow definition.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowEntry {
    /// Workflow name
    pub name: String,
    /// Folder path relative to `site/wwwroot/`
    pub path: String,
    /// Parsed `workflow.json`
    pub definition: Map<String, Value>,
}

/// A workflow definition with sensitive values redacted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskedWorkflowEntry {
    /// Workflow name
    pub name: String,
    /// Folder path relative to `site/wwwroot/`
    pub path: String,
    /// Redacted `workflow.json`
    pub definition: Map<String, Value>,
}

impl MaskedWorkflowEntry {
    /// Masks an entry, taking ownership so the unmasked document cannot
    /// outlive this call.
    ///
    /// Returns the entry and the number of redacted values.
    pub fn mask(entry: WorkflowEntry, masker: &SecretMasker) -> (Self, usize) {
        let mut definition = Value::Object(entry.definition);
        let redactions = masker.mask_in_place(&mut definition);
        let definition = match definition {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        (
            Self {
                name: entry.name,
                path: entry.path,
                definition,
            },
            redactions,
        )
    }
}

/// A workflow that could not be backed up in this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowFailure {
    /// Workflow name
    pub name: String,
    /// Folder path relative to `site/wwwroot/`
    pub path: String,
    /// Why it failed
    pub reason: String,
}

impl WorkflowFailure {
    /// Records a per-workflow error.
    pub fn new(name: impl Into<String>, path: impl Into<String>, err: &BackupError) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

/// The latest backup of one site, written as a single JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    /// Site name
    pub site: String,
    /// When the fetch phase completed
    pub taken_at: DateTime<Utc>,
    /// Masked workflows, sorted by name
    pub workflows: Vec<MaskedWorkflowEntry>,
    /// Workflows that failed in this run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<WorkflowFailure>,
}

impl BackupSnapshot {
    /// Creates a snapshot, sorting workflows by name.
    pub fn new(
        site: impl Into<String>,
        taken_at: DateTime<Utc>,
        mut workflows: Vec<MaskedWorkflowEntry>,
        failed: Vec<WorkflowFailure>,
    ) -> Self {
        workflows.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            site: site.into(),
            taken_at,
            workflows,
            failed,
        }
    }

    /// Blob path of the latest snapshot for a site.
    pub fn blob_path(site: &str) -> String {
        format!("{}/latest.json", site)
    }

    /// Serializes the snapshot as pretty-printed JSON.
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parses a stored snapshot.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
