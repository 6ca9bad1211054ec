//! logicapps-backup - Scheduled backup of Logic Apps (Standard) workflows.
//!
//! Logic Apps Standard stores each workflow as a `workflow.json` file in the
//! site's content share. This crate fetches those files through the Kudu VFS
//! API, redacts secrets, and keeps the latest copy in Azure Blob Storage.
//!
//! # Features
//!
//! - **Managed identity only**: ARM and Blob Storage are reached with tokens
//!   from the host's identity; Kudu credentials are fetched per run and never
//!   stored or logged
//! - **Automatic discovery**: new workflows are picked up without
//!   configuration, including those under a `Workflows/` folder
//! - **Structural redaction**: sensitive keys are masked at any depth
//! - **Partial-failure tolerance**: one broken workflow does not stop the
//!   others from being backed up
//! - **Latest-only**: every run overwrites a single snapshot blob
//!
//! # Quick Start
//!
//! ```no_run
//! use logicapps_backup::{BackupPipeline, Config};
//!
//! #[tokio::main]
//! async fn main() -> logicapps_backup::Result<()> {
//!     let config = Config::from_env()?;
//!     let pipeline = BackupPipeline::from_config(config)?;
//!
//!     let report = pipeline.run().await?;
//!     println!("backed up {:?} to {}", report.backed_up, report.blob_path);
//!     Ok(())
//! }
//! ```
//!
//! # Pipeline
//!
//! | Stage | Module | Failure |
//! |-------|--------|---------|
//! | Publishing credentials via ARM | [`credentials`] | fatal |
//! | Folder discovery | [`lister`] | fatal |
//! | `workflow.json` download | [`fetcher`] | per workflow |
//! | Redaction | [`masker`] | none |
//! | Snapshot upload | [`store`] | fatal |
//!
//! # Feature Flags
//!
//! - `mock` (default): in-memory [`store::MemorySnapshotStore`] and
//!   [`token::StaticTokenProvider`] for tests and dry runs

pub mod config;
pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod kudu;
pub mod lister;
pub mod masker;
pub mod pipeline;
pub mod retry;
pub mod schedule;
pub mod snapshot;
pub mod store;
pub mod token;
pub mod validation;

pub use config::{Config, SiteIdentity};
pub use error::{BackupError, Result};
pub use masker::SecretMasker;
pub use pipeline::{BackupPipeline, RunOutcome, RunReport};
pub use schedule::{Schedule, Scheduler};
pub use snapshot::BackupSnapshot;
pub use store::SnapshotStore;
