use std::fmt::{Display, Formatter};

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Hash)]
pub enum DownloadStatus {
    #[default]
    None,
    Downloading,
    Paused,
    Verifying,
    Installing,
}

impl DownloadStatus {
    /// Verifying and installing refuse user actions.
    pub fn is_busy(&self) -> bool {
        matches!(self, DownloadStatus::Verifying | DownloadStatus::Installing)
    }
}

impl Display for DownloadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadStatus::None => write!(f, "None"),
            DownloadStatus::Downloading => write!(f, "Downloading"),
            DownloadStatus::Paused => write!(f, "Paused"),
            DownloadStatus::Verifying => write!(f, "Verifying"),
            DownloadStatus::Installing => write!(f, "Installing"),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Hash)]
pub enum InstallState {
    #[default]
    NotInstalled,
    InstalledOld,
    InstalledLatest,
}

impl InstallState {
    /// Compare an installed version code against the one the catalog advertises.
    pub fn from_version_codes(installed: Option<i64>, catalog: Option<i64>) -> InstallState {
        match (installed, catalog) {
            (None, _) => InstallState::NotInstalled,
            (Some(installed), Some(catalog)) if catalog > installed => InstallState::InstalledOld,
            (Some(_), _) => InstallState::InstalledLatest,
        }
    }

    /// State after installing `installed_version` while the catalog knows `latest_version`.
    pub fn after_install(installed_version: i64, latest_version: Option<i64>) -> InstallState {
        match latest_version {
            Some(latest) if installed_version < latest => InstallState::InstalledOld,
            _ => InstallState::InstalledLatest,
        }
    }
}

impl Display for InstallState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallState::NotInstalled => write!(f, "NotInstalled"),
            InstallState::InstalledOld => write!(f, "InstalledOld"),
            InstallState::InstalledLatest => write!(f, "InstalledLatest"),
        }
    }
}
