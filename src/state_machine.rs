use crate::download_status::DownloadStatus;

/// What a toggle means for a task, decided only by its recorded status.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ToggleIntent {
    /// Nothing recorded: begin from scratch, progress starts at 0.
    Start,
    /// Paused: continue from the bytes already on disk.
    Resume,
    Pause,
    /// Verifying or installing, no user action accepted.
    Ignore,
}

impl ToggleIntent {
    pub fn for_status(status: DownloadStatus) -> ToggleIntent {
        if status.is_busy() {
            return ToggleIntent::Ignore;
        }
        match status {
            DownloadStatus::Downloading => ToggleIntent::Pause,
            DownloadStatus::Paused => ToggleIntent::Resume,
            _ => ToggleIntent::Start,
        }
    }
}

/// Transitions a running job may drive. Removal resets from any status and
/// bypasses this table.
pub fn can_transition(from: DownloadStatus, to: DownloadStatus) -> bool {
    use DownloadStatus::*;
    matches!(
        (from, to),
        (None, Downloading)
            | (Paused, Downloading)
            | (Downloading, Paused)
            | (Downloading, Verifying)
            | (Verifying, Installing)
            | (Verifying, Paused)
            | (Installing, None)
            | (Installing, Paused)
    )
}
