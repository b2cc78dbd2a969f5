//! # store-downloader
//!
//! Acquires application packages over HTTP and installs them, letting the
//! user pause, resume or cancel each download without losing transferred bytes.
//!
//! Features:
//! - At most one transfer per (artifact, version)
//! - Range-based resume with fallback to a full download
//! - Pause versus delete disambiguation on cancel
//! - Observable state snapshots for catalog, queue and recent installs

mod stream;
mod remote_file;
pub mod error;
pub mod task_key;
pub mod download_status;
pub mod catalog;
pub mod download_configuration;
pub mod file_verify;
pub mod transfer;
pub mod task_registry;
pub mod state_machine;
pub mod state_store;
pub mod collaborators;
pub mod sweep;
pub mod orchestrator;

pub use catalog::{CatalogEntry, EntryAction, RecentInstall};
pub use collaborators::{Installer, UrlResolver};
pub use download_configuration::DownloadConfiguration;
pub use download_status::{DownloadStatus, InstallState};
pub use error::{DownloadError, Result};
pub use orchestrator::{DownloadOrchestrator, ToggleOutcome};
pub use state_store::{StateStore, StoreSnapshot};
pub use task_key::TaskKey;
pub use transfer::{TransferEngine, TransferOutcome, TransferReport};
