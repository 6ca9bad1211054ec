//! One end-to-end backup run.
//!
//! credentials → folder listing → fetch (bounded concurrency) → mask →
//! single snapshot write. The write happens only after every fetch has
//! finished, so an interrupted run never leaves a partial snapshot behind.

use crate::credentials::CredentialResolver;
use crate::fetcher::fetch_all;
use crate::kudu::KuduClient;
use crate::lister::list_workflow_folders;
use crate::masker::SecretMasker;
use crate::retry::RetryPolicy;
use crate::snapshot::{BackupSnapshot, MaskedWorkflowEntry, WorkflowFailure};
use crate::store::{BlobSnapshotStore, SnapshotStore};
use crate::token::{ManagedIdentityTokenProvider, TokenProvider};
use crate::{BackupError, Config, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// How a completed run went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every discovered workflow was backed up
    Success,
    /// The snapshot was written but some workflows failed
    PartialSuccess,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Run identifier, also attached to the run's log span
    pub run_id: Uuid,
    /// Site name
    pub site: String,
    /// Candidate folders found by the lister
    pub candidates: usize,
    /// Workflows written to the snapshot, by name
    pub backed_up: Vec<String>,
    /// Workflows that failed
    pub failures: Vec<WorkflowFailure>,
    /// Values redacted across all workflows
    pub redactions: usize,
    /// Where the snapshot was written
    pub blob_path: String,
    /// Overall result
    pub outcome: RunOutcome,
}

/// Backup pipeline for one site.
///
/// # Example
///
/// ```no_run
/// use logicapps_backup::{BackupPipeline, Config};
///
/// #[tokio::main]
/// async fn main() -> logicapps_backup::Result<()> {
///     let config = Config::from_env()?;
///     let pipeline = BackupPipeline::from_config(config)?;
///
///     let report = pipeline.run().await?;
///     println!("{} workflows backed up", report.backed_up.len());
///     Ok(())
/// }
/// ```
pub struct BackupPipeline {
    config: Config,
    client: reqwest::Client,
    resolver: CredentialResolver,
    masker: SecretMasker,
    store: Arc<dyn SnapshotStore>,
}

impl BackupPipeline {
    /// Creates a pipeline with explicit token provider and store.
    pub fn new(
        config: Config,
        tokens: Arc<dyn TokenProvider>,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self> {
        config.validate()?;
        let client = build_client(&config)?;

        Ok(Self {
            resolver: CredentialResolver::new(&config, client.clone(), tokens),
            masker: SecretMasker::new(&config.sensitive_keys),
            client,
            store,
            config,
        })
    }

    /// Creates the production pipeline: managed identity and Blob Storage.
    pub fn from_config(config: Config) -> Result<Self> {
        let tokens: Arc<dyn TokenProvider> = Arc::new(ManagedIdentityTokenProvider::new()?);
        let client = build_client(&config)?;
        let store = Arc::new(BlobSnapshotStore::new(&config, client, tokens.clone()));
        Self::new(config, tokens, store)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Performs one full backup run.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the run: authentication,
    /// authorization, listing or storage write. Per-workflow failures do not
    /// fail the run; they are listed in the report.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("backup_run", %run_id, site = %self.config.site.site_name);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<RunReport> {
        let site = &self.config.site;
        info!(store = self.store.name(), "backup run started");

        let credentials = self.resolver.resolve(site).await?;
        let kudu = KuduClient::new(
            self.client.clone(),
            RetryPolicy::new(self.config.retry_max, self.config.retry_backoff),
            self.config.scm_base_url(),
            credentials,
        );

        let folders = list_workflow_folders(&kudu).await?;
        let fetched = fetch_all(&kudu, &folders, self.config.fetch_concurrency).await;
        drop(kudu);

        let taken_at = Utc::now();
        let mut redactions = 0;
        let masked: Vec<MaskedWorkflowEntry> = fetched
            .entries
            .into_iter()
            .map(|entry| {
                let (masked, count) = MaskedWorkflowEntry::mask(entry, &self.masker);
                debug!(workflow = %masked.name, redactions = count, "workflow masked");
                redactions += count;
                masked
            })
            .collect();

        let snapshot = BackupSnapshot::new(&site.site_name, taken_at, masked, fetched.failures);
        let blob_path = BackupSnapshot::blob_path(&site.site_name);
        let bytes = snapshot.to_bytes()?;

        self.store
            .write(&blob_path, bytes)
            .await
            .map_err(|e| match e {
                BackupError::StorageWrite(_) => e,
                other => BackupError::StorageWrite(other.to_string()),
            })?;

        let outcome = if snapshot.failed.is_empty() {
            RunOutcome::Success
        } else {
            RunOutcome::PartialSuccess
        };
        let report = RunReport {
            run_id,
            site: site.site_name.clone(),
            candidates: folders.len(),
            backed_up: snapshot.workflows.iter().map(|w| w.name.clone()).collect(),
            failures: snapshot.failed,
            redactions,
            blob_path,
            outcome,
        };

        match report.outcome {
            RunOutcome::Success => info!(
                candidates = report.candidates,
                backed_up = report.backed_up.len(),
                skipped = fetched.skipped.len(),
                redactions = report.redactions,
                blob = %report.blob_path,
                "backup run succeeded"
            ),
            RunOutcome::PartialSuccess => warn!(
                candidates = report.candidates,
                backed_up = report.backed_up.len(),
                failed = report.failures.len(),
                blob = %report.blob_path,
                "backup run finished with failed workflows"
            ),
        }

        Ok(report)
    }
}

fn build_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.http_timeout)
        .user_agent(concat!("logicapps-backup/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| BackupError::Config(format!("failed to build HTTP client: {}", e)))
}
