use chrono::{DateTime, Utc};
use crate::download_status::{DownloadStatus, InstallState};
use crate::error::DownloadError;
use crate::task_key::TaskKey;

/// One (artifact, version) the store knows about, with its rendered transfer state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatalogEntry {
    pub artifact_id: String,
    pub version_id: Option<i64>,
    pub name: String,
    pub category: String,
    pub version_name: String,
    /// Monotonic build number used to compare against what is installed.
    pub version_code: Option<i64>,
    pub description: String,
    /// Expected xxh64 of the package, when the catalog publishes one.
    pub checksum: Option<u64>,
    pub install_state: InstallState,
    pub download_status: DownloadStatus,
    pub progress: u8,
    pub last_error: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EntryAction {
    Install,
    Upgrade,
    Open,
    Pause,
    Resume,
    Busy,
}

impl CatalogEntry {
    pub fn new(artifact_id: impl Into<String>, version_id: Option<i64>) -> Self {
        let artifact_id = artifact_id.into();
        Self {
            name: artifact_id.clone(),
            artifact_id,
            version_id,
            ..Default::default()
        }
    }

    pub fn task_key(&self) -> crate::error::Result<TaskKey> {
        match self.version_id {
            Some(version_id) => Ok(TaskKey::new(self.artifact_id.clone(), version_id)),
            None => Err(DownloadError::IdentityMissing(self.artifact_id.clone())),
        }
    }

    pub fn matches(&self, key: &TaskKey) -> bool {
        self.artifact_id == key.artifact_id && self.version_id == Some(key.version_id)
    }

    pub fn action(&self) -> EntryAction {
        if self.download_status.is_busy() {
            return EntryAction::Busy;
        }
        match self.download_status {
            DownloadStatus::Downloading => EntryAction::Pause,
            DownloadStatus::Paused => EntryAction::Resume,
            _ => match self.install_state {
                InstallState::NotInstalled => EntryAction::Install,
                InstallState::InstalledOld => EntryAction::Upgrade,
                InstallState::InstalledLatest => EntryAction::Open,
            },
        }
    }

    pub fn action_enabled(&self) -> bool {
        !matches!(self.action(), EntryAction::Busy | EntryAction::Open)
    }

    pub fn progress_label(&self) -> String {
        match self.download_status {
            DownloadStatus::Downloading => format!("{}%", self.progress),
            DownloadStatus::Paused => "paused".to_string(),
            DownloadStatus::Verifying => "verifying".to_string(),
            DownloadStatus::Installing => "installing".to_string(),
            DownloadStatus::None => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecentInstall {
    pub entry: CatalogEntry,
    pub installed_at: DateTime<Utc>,
}
