use std::collections::HashMap;
use std::sync::Arc;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};
use crate::catalog::{CatalogEntry, RecentInstall};
use crate::download_status::{DownloadStatus, InstallState};
use crate::state_machine::can_transition;
use crate::task_key::TaskKey;

/// Immutable view of every canonical list, as handed to observers.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub catalog: Vec<CatalogEntry>,
    pub queue: Vec<CatalogEntry>,
    pub recent: Vec<RecentInstall>,
}

impl StoreSnapshot {
    /// The record tracking `key`: its queue entry, else the catalog entry at that version.
    pub fn entry(&self, key: &TaskKey) -> Option<&CatalogEntry> {
        self.queue
            .iter()
            .find(|entry| entry.matches(key))
            .or_else(|| self.catalog.iter().find(|entry| entry.matches(key)))
    }

    pub fn status_of(&self, key: &TaskKey) -> DownloadStatus {
        self.entry(key).map(|entry| entry.download_status).unwrap_or_default()
    }

    pub fn catalog_entry(&self, artifact_id: &str) -> Option<&CatalogEntry> {
        self.catalog.iter().find(|entry| entry.artifact_id == artifact_id)
    }

    pub fn is_queued(&self, key: &TaskKey) -> bool {
        self.queue.iter().any(|entry| entry.matches(key))
    }

    /// Apply `transform` to the queue entry of the key and to the catalog entry
    /// when the catalog lists that same version.
    fn update<F>(&mut self, key: &TaskKey, transform: F) -> bool
        where F: Fn(&mut CatalogEntry)
    {
        let mut changed = false;
        if let Some(master) = self.catalog.iter_mut().find(|entry| entry.matches(key)) {
            transform(master);
            changed = true;
        }
        if let Some(queued) = self.queue.iter_mut().find(|entry| entry.matches(key)) {
            transform(queued);
            changed = true;
        }
        changed
    }
}

/// Single source of truth for catalog, download queue and recent installs.
/// Every mutation runs under one lock and publishes a fresh snapshot before
/// releasing it.
pub struct StateStore {
    state: Mutex<StoreSnapshot>,
    sender: watch::Sender<Arc<StoreSnapshot>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Arc::new(StoreSnapshot::default()));
        Self {
            state: Mutex::new(StoreSnapshot::default()),
            sender,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.sender.borrow().clone()
    }

    pub fn status_of(&self, key: &TaskKey) -> DownloadStatus {
        self.state.lock().status_of(key)
    }

    fn mutate<R, F>(&self, f: F) -> R
        where F: FnOnce(&mut StoreSnapshot) -> R
    {
        let mut state = self.state.lock();
        let result = f(&mut state);
        self.sender.send_replace(Arc::new(state.clone()));
        result
    }

    /// Merge one category of freshly fetched releases. Releases are deduplicated by
    /// artifact keeping the newest version; the transfer state of that exact
    /// version is preserved.
    pub fn merge_catalog<F>(&self, category: &str, releases: Vec<CatalogEntry>, installed_code: F)
        where F: Fn(&str) -> Option<i64>
    {
        let mut newest: Vec<CatalogEntry> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for release in releases {
            match index.get(&release.artifact_id) {
                Some(&i) => {
                    if release.version_id.unwrap_or(-1) > newest[i].version_id.unwrap_or(-1) {
                        newest[i] = release;
                    }
                }
                None => {
                    index.insert(release.artifact_id.clone(), newest.len());
                    newest.push(release);
                }
            }
        }

        self.mutate(|state| {
            let merged: Vec<CatalogEntry> = newest
                .into_iter()
                .map(|mut release| {
                    release.category = category.to_string();
                    release.install_state = InstallState::from_version_codes(
                        installed_code(&release.artifact_id),
                        release.version_code,
                    );
                    let tracked = state
                        .queue
                        .iter()
                        .find(|queued| queued.artifact_id == release.artifact_id && queued.version_id == release.version_id)
                        .or_else(|| {
                            state
                                .catalog_entry(&release.artifact_id)
                                .filter(|local| local.version_id == release.version_id)
                        });
                    if let Some(local) = tracked {
                        release.download_status = local.download_status;
                        release.progress = local.progress;
                        release.last_error = local.last_error.clone();
                    }
                    release
                })
                .collect();
            debug!(category, count = merged.len(), "catalog merged");
            state.catalog.retain(|entry| entry.category != category);
            state.catalog.extend(merged);
        });
    }

    /// Re-track an entry known from an earlier session. A task cannot still be
    /// running after a restart, so `Downloading` is recorded as `Paused`.
    pub fn restore(&self, mut entry: CatalogEntry) -> bool {
        if entry.version_id.is_none() {
            return false;
        }
        if matches!(entry.download_status, DownloadStatus::Downloading | DownloadStatus::Verifying | DownloadStatus::Installing) {
            entry.download_status = DownloadStatus::Paused;
        }
        self.mutate(|state| {
            let queued = state.queue.iter().any(|queued| {
                queued.artifact_id == entry.artifact_id && queued.version_id == entry.version_id
            });
            if queued {
                return false;
            }
            state.queue.push(entry);
            true
        })
    }

    /// Record a job starting for `entry`, enqueueing it when it is not tracked yet.
    /// A fresh start resets progress; a resume keeps the last recorded progress.
    pub fn mark_started(&self, key: &TaskKey, entry: &CatalogEntry, fresh: bool) -> bool {
        self.mutate(|state| {
            let from = state.status_of(key);
            if !can_transition(from, DownloadStatus::Downloading) {
                warn!(%key, %from, "refusing to start");
                return false;
            }
            if !state.is_queued(key) {
                let mut queued = entry.clone();
                queued.download_status = from;
                state.queue.push(queued);
            }
            state.update(key, |entry| {
                entry.download_status = DownloadStatus::Downloading;
                entry.last_error = None;
                if fresh {
                    entry.progress = 0;
                }
            });
            true
        })
    }

    /// Move `key` to `to` if the transition table allows it.
    pub fn transition(&self, key: &TaskKey, to: DownloadStatus) -> bool {
        self.transition_with(key, to, |_| {})
    }

    pub fn transition_with<F>(&self, key: &TaskKey, to: DownloadStatus, transform: F) -> bool
        where F: Fn(&mut CatalogEntry)
    {
        self.mutate(|state| {
            let from = state.status_of(key);
            if !can_transition(from, to) {
                debug!(%key, %from, %to, "transition refused");
                return false;
            }
            state.update(key, |entry| {
                entry.download_status = to;
                transform(entry);
            })
        })
    }

    /// Land a failed task in `Paused` with an error indication.
    pub fn fail(&self, key: &TaskKey, error: &str) -> bool {
        let error = error.to_string();
        self.transition_with(key, DownloadStatus::Paused, |entry| {
            entry.last_error = Some(error.clone());
        })
    }

    /// Record progress; never lowers the value while the task is downloading.
    pub fn set_progress(&self, key: &TaskKey, progress: u8) {
        let progress = progress.min(100);
        let mut state = self.state.lock();
        if state.status_of(key) != DownloadStatus::Downloading {
            return;
        }
        let current = state.entry(key).map(|entry| entry.progress).unwrap_or(0);
        if progress <= current {
            return;
        }
        state.update(key, |entry| entry.progress = progress);
        self.sender.send_replace(Arc::new(state.clone()));
    }

    /// Finish a successful install: recompute the install state against the
    /// catalog's newest version, record it as recent and drop it from the queue.
    pub fn complete_install(&self, key: &TaskKey) -> Option<InstallState> {
        self.mutate(|state| {
            let from = state.status_of(key);
            if !can_transition(from, DownloadStatus::None) {
                warn!(%key, %from, "install finished in unexpected status");
                return None;
            }
            let latest = state.catalog_entry(&key.artifact_id).and_then(|entry| entry.version_id);
            let install_state = InstallState::after_install(key.version_id, latest);
            let installed = state.entry(key).cloned();

            state.update(key, |entry| {
                entry.download_status = DownloadStatus::None;
                entry.progress = 0;
                entry.install_state = install_state;
            });
            // Install state is per artifact, whichever version was installed.
            if let Some(master) = state.catalog.iter_mut().find(|entry| entry.artifact_id == key.artifact_id) {
                master.install_state = install_state;
            }

            if let Some(mut installed) = installed {
                installed.download_status = DownloadStatus::None;
                installed.progress = 0;
                installed.install_state = install_state;
                state.recent.retain(|recent| recent.entry.artifact_id != installed.artifact_id);
                state.recent.insert(0, RecentInstall {
                    entry: installed,
                    installed_at: Utc::now(),
                });
            }
            state.queue.retain(|entry| !entry.matches(key));
            Some(install_state)
        })
    }

    /// Forget the transfer for `key`: drop its queue entry and reset its status.
    pub fn remove_task(&self, key: &TaskKey) {
        self.mutate(|state| {
            state.queue.retain(|entry| !entry.matches(key));
            state.update(key, |entry| {
                entry.download_status = DownloadStatus::None;
                entry.progress = 0;
                entry.last_error = None;
            });
        });
    }

    pub fn queue(&self) -> Vec<CatalogEntry> {
        self.state.lock().queue.clone()
    }
}

#[cfg(test)]
mod test {
    use crate::catalog::CatalogEntry;
    use crate::download_status::{DownloadStatus, InstallState};
    use crate::task_key::TaskKey;
    use super::StateStore;

    fn release(artifact: &str, version: i64, code: i64) -> CatalogEntry {
        let mut entry = CatalogEntry::new(artifact, Some(version));
        entry.version_code = Some(code);
        entry
    }

    #[test]
    fn test_merge_keeps_newest_version_per_artifact() {
        let store = StateStore::new();
        store.merge_catalog(
            "tools",
            vec![release("a", 1, 10), release("a", 3, 30), release("a", 2, 20), release("b", 5, 50)],
            |artifact| if artifact == "a" { Some(20) } else { None },
        );

        let snapshot = store.snapshot();
        assert_eq!(snapshot.catalog.len(), 2);
        let a = snapshot.catalog_entry("a").unwrap();
        assert_eq!(a.version_id, Some(3));
        assert_eq!(a.install_state, InstallState::InstalledOld);
        assert_eq!(snapshot.catalog_entry("b").unwrap().install_state, InstallState::NotInstalled);
    }

    #[test]
    fn test_merge_preserves_local_transfer_state() {
        let store = StateStore::new();
        store.merge_catalog("tools", vec![release("a", 1, 10)], |_| None);
        let key = TaskKey::new("a", 1);
        let entry = store.snapshot().catalog_entry("a").cloned().unwrap();
        assert!(store.mark_started(&key, &entry, true));
        store.set_progress(&key, 30);

        store.merge_catalog("tools", vec![release("a", 1, 10)], |_| None);
        store.merge_catalog("games", vec![release("g", 1, 1)], |_| None);
        let snapshot = store.snapshot();
        let a = snapshot.catalog_entry("a").unwrap();
        assert_eq!(a.download_status, DownloadStatus::Downloading);
        assert_eq!(a.progress, 30);
        assert_eq!(snapshot.catalog.len(), 2);

        // A newer release is its own task; the running one stays queued.
        store.merge_catalog("tools", vec![release("a", 2, 20)], |_| None);
        let snapshot = store.snapshot();
        let a = snapshot.catalog_entry("a").unwrap();
        assert_eq!(a.version_id, Some(2));
        assert_eq!(a.download_status, DownloadStatus::None);
        assert_eq!(snapshot.status_of(&TaskKey::new("a", 2)), DownloadStatus::None);
        assert_eq!(snapshot.status_of(&key), DownloadStatus::Downloading);
        assert_eq!(snapshot.entry(&key).unwrap().progress, 30);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let store = StateStore::new();
        let entry = CatalogEntry::new("a", Some(1));
        let key = entry.task_key().unwrap();
        assert!(store.mark_started(&key, &entry, true));

        store.set_progress(&key, 40);
        store.set_progress(&key, 10);
        assert_eq!(store.snapshot().entry(&key).unwrap().progress, 40);

        assert!(store.transition(&key, DownloadStatus::Paused));
        store.set_progress(&key, 90);
        assert_eq!(store.snapshot().entry(&key).unwrap().progress, 40);

        // Resuming keeps the recorded progress.
        assert!(store.mark_started(&key, &entry, false));
        assert_eq!(store.snapshot().entry(&key).unwrap().progress, 40);
    }

    #[test]
    fn test_queue_holds_a_key_once() {
        let store = StateStore::new();
        let entry = CatalogEntry::new("a", Some(1));
        let key = entry.task_key().unwrap();
        assert!(store.mark_started(&key, &entry, true));
        assert!(!store.mark_started(&key, &entry, true));
        assert!(!store.restore(entry.clone()));
        assert_eq!(store.queue().len(), 1);

        let mut other = CatalogEntry::new("a", Some(2));
        other.download_status = DownloadStatus::Downloading;
        assert!(store.restore(other));
        let queue = store.queue();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[1].download_status, DownloadStatus::Paused);
    }

    #[test]
    fn test_complete_install_against_advanced_catalog() {
        let store = StateStore::new();
        store.merge_catalog("tools", vec![release("a", 1, 10)], |_| None);
        let entry = store.snapshot().catalog_entry("a").cloned().unwrap();
        let key = entry.task_key().unwrap();

        assert!(store.mark_started(&key, &entry, true));
        assert!(store.transition(&key, DownloadStatus::Verifying));
        assert!(store.transition(&key, DownloadStatus::Installing));

        // The catalog moved on while the download was in flight.
        store.merge_catalog("tools", vec![release("a", 2, 20)], |_| None);

        assert_eq!(store.complete_install(&key), Some(InstallState::InstalledOld));
        let snapshot = store.snapshot();
        assert!(snapshot.queue.is_empty());
        assert_eq!(snapshot.recent.len(), 1);
        assert_eq!(snapshot.recent[0].entry.install_state, InstallState::InstalledOld);
        assert_eq!(snapshot.catalog_entry("a").unwrap().download_status, DownloadStatus::None);
    }

    #[test]
    fn test_failure_after_removal_is_refused() {
        let store = StateStore::new();
        let entry = CatalogEntry::new("a", Some(1));
        let key = entry.task_key().unwrap();
        assert!(store.mark_started(&key, &entry, true));
        store.remove_task(&key);
        assert!(!store.fail(&key, "late error"));
        assert_eq!(store.status_of(&key), DownloadStatus::None);
        assert!(store.queue().is_empty());
    }

    #[test]
    fn test_versions_of_one_artifact_are_independent() {
        let store = StateStore::new();
        store.merge_catalog("tools", vec![release("a", 2, 20)], |_| None);
        let latest = store.snapshot().catalog_entry("a").cloned().unwrap();
        let old_key = TaskKey::new("a", 1);
        let latest_key = latest.task_key().unwrap();

        assert!(store.mark_started(&old_key, &release("a", 1, 10), true));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.status_of(&old_key), DownloadStatus::Downloading);
        assert_eq!(snapshot.status_of(&latest_key), DownloadStatus::None);
        assert_eq!(snapshot.catalog_entry("a").unwrap().download_status, DownloadStatus::None);

        // A resume of an untracked key still lands in the queue.
        assert!(store.mark_started(&latest_key, &latest, false));
        let snapshot = store.snapshot();
        assert!(snapshot.is_queued(&latest_key));
        assert_eq!(snapshot.queue.len(), 2);

        assert!(store.transition(&latest_key, DownloadStatus::Paused));
        assert_eq!(store.status_of(&old_key), DownloadStatus::Downloading);
    }

    #[tokio::test]
    async fn test_observers_see_snapshots() {
        let store = StateStore::new();
        let mut receiver = store.subscribe();
        let entry = CatalogEntry::new("a", Some(1));
        let key = entry.task_key().unwrap();

        store.mark_started(&key, &entry, true);
        receiver.changed().await.unwrap();
        let snapshot = receiver.borrow_and_update().clone();
        assert_eq!(snapshot.status_of(&key), DownloadStatus::Downloading);
        assert!(snapshot.is_queued(&key));
    }
}
