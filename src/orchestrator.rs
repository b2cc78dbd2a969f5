use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use crate::catalog::CatalogEntry;
use crate::collaborators::{Installer, UrlResolver};
use crate::download_configuration::DownloadConfiguration;
use crate::download_status::DownloadStatus;
use crate::error::DownloadError;
use crate::file_verify::{file_validate, FileVerify};
use crate::state_machine::ToggleIntent;
use crate::state_store::{StateStore, StoreSnapshot};
use crate::stream::remove_partial;
use crate::sweep::{scan_partial_files, PartialFile};
use crate::task_key::TaskKey;
use crate::task_registry::{BeginOutcome, StartToken, TaskRegistry};
use crate::transfer::{TransferEngine, TransferOutcome, TransferReport};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ToggleOutcome {
    Started,
    Resumed,
    /// Cancellation requested; the job settles in `Paused`.
    Pausing,
    /// A job for the key is still registered; nothing was done.
    AlreadyRunning,
    /// Verifying or installing.
    Ignored,
}

struct Inner {
    config: Arc<DownloadConfiguration>,
    engine: TransferEngine,
    store: Arc<StateStore>,
    registry: Arc<TaskRegistry>,
    resolver: Arc<dyn UrlResolver>,
    installer: Arc<dyn Installer>,
    runtime: Handle,
}

/// Entry point for callers: translates start, pause, resume and delete
/// requests into registry and store operations. Every method returns without
/// waiting on network or disk.
#[derive(Clone)]
pub struct DownloadOrchestrator {
    inner: Arc<Inner>,
}

impl DownloadOrchestrator {
    /// Must be called from within a Tokio runtime; jobs are spawned onto it.
    pub fn new(
        config: DownloadConfiguration,
        store: Arc<StateStore>,
        resolver: Arc<dyn UrlResolver>,
        installer: Arc<dyn Installer>,
    ) -> crate::error::Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| DownloadError::Config(format!("no tokio runtime: {}", e)))?;
        Self::with_runtime(config, store, resolver, installer, runtime)
    }

    pub fn with_runtime(
        config: DownloadConfiguration,
        store: Arc<StateStore>,
        resolver: Arc<dyn UrlResolver>,
        installer: Arc<dyn Installer>,
        runtime: Handle,
    ) -> crate::error::Result<Self> {
        let engine = TransferEngine::from_config(&config)?;
        Ok(Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                engine,
                store,
                registry: Arc::new(TaskRegistry::new()),
                resolver,
                installer,
                runtime,
            }),
        })
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.inner.store
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &DownloadConfiguration {
        &self.inner.config
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.inner.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        self.inner.store.subscribe()
    }

    pub fn is_running(&self, key: &TaskKey) -> bool {
        self.inner.registry.is_running(key)
    }

    /// Start, resume or pause the download of `entry`, depending only on the
    /// status the store records for it.
    pub fn toggle_download(&self, entry: &CatalogEntry) -> crate::error::Result<ToggleOutcome> {
        let key = entry.task_key()?;
        let status = self.inner.store.status_of(&key);

        let fresh = match ToggleIntent::for_status(status) {
            ToggleIntent::Ignore => {
                debug!(%key, %status, "toggle ignored");
                return Ok(ToggleOutcome::Ignored);
            }
            ToggleIntent::Pause => {
                if !self.inner.registry.cancel(&key) {
                    // Recorded as downloading but nothing runs, settle it.
                    warn!(%key, "no job behind downloading task");
                    self.inner.store.transition(&key, DownloadStatus::Paused);
                }
                info!(%key, "pause requested");
                return Ok(ToggleOutcome::Pausing);
            }
            ToggleIntent::Start => true,
            ToggleIntent::Resume => false,
        };

        let token = match self.inner.registry.try_begin(&key) {
            BeginOutcome::AlreadyRunning => {
                debug!(%key, "job already registered");
                return Ok(ToggleOutcome::AlreadyRunning);
            }
            BeginOutcome::Started(token) => token,
        };

        if !self.inner.store.mark_started(&key, entry, fresh) {
            self.inner.registry.end(&key);
            return Ok(ToggleOutcome::Ignored);
        }

        info!(%key, fresh, "download job starting");
        let inner = self.inner.clone();
        let entry = entry.clone();
        self.inner.runtime.spawn(async move {
            inner.run_job(entry, token).await;
        });

        Ok(match fresh {
            true => ToggleOutcome::Started,
            false => ToggleOutcome::Resumed,
        })
    }

    /// Abandon the download of `entry`: cancel any job as a deletion, discard
    /// the file and forget the task. The file is deleted while the key is held
    /// in the registry, so a toggle racing the removal cannot reuse its bytes.
    pub fn remove_download(&self, entry: &CatalogEntry) -> crate::error::Result<()> {
        let key = entry.task_key()?;
        let registry = &self.inner.registry;

        loop {
            match registry.try_begin(&key) {
                BeginOutcome::Started(token) => {
                    let inner = self.inner.clone();
                    self.inner.runtime.spawn(async move {
                        inner.run_removal(token).await;
                    });
                    break;
                }
                BeginOutcome::AlreadyRunning => {
                    registry.mark_for_deletion(&key);
                    if registry.cancel(&key) {
                        break;
                    }
                    // The job left between the two calls; claim the key instead.
                    registry.take_deletion_intent(&key);
                }
            }
        }

        self.inner.store.remove_task(&key);
        info!(%key, "download removed");
        Ok(())
    }

    /// Resume every paused task in the queue. Returns the keys that were toggled.
    pub fn resume_all_paused(&self) -> Vec<TaskKey> {
        let paused: Vec<CatalogEntry> = self.inner.store
            .queue()
            .into_iter()
            .filter(|entry| entry.download_status == DownloadStatus::Paused)
            .collect();

        let mut toggled = Vec::with_capacity(paused.len());
        for entry in &paused {
            match self.toggle_download(entry) {
                Ok(outcome) => {
                    debug!(artifact = %entry.artifact_id, ?outcome, "paused task toggled");
                    if let Ok(key) = entry.task_key() {
                        toggled.push(key);
                    }
                }
                Err(e) => warn!(artifact = %entry.artifact_id, "cannot resume: {}", e),
            }
        }
        toggled
    }

    /// Download and install an older version of `entry` as its own task.
    pub fn install_history_version(
        &self,
        entry: &CatalogEntry,
        version_id: i64,
        version_name: impl Into<String>,
    ) -> crate::error::Result<ToggleOutcome> {
        let mut history = entry.clone();
        history.version_id = Some(version_id);
        history.version_name = version_name.into();
        history.version_code = None;
        history.checksum = None;
        history.download_status = DownloadStatus::None;
        history.progress = 0;
        history.last_error = None;
        self.toggle_download(&history)
    }

    /// Merge a category of releases fetched from the catalog service.
    pub fn refresh_catalog(&self, category: &str, releases: Vec<CatalogEntry>) {
        let installer = self.inner.installer.clone();
        self.inner.store.merge_catalog(category, releases, |artifact| {
            installer.installed_version_code(artifact)
        });
    }

    /// Download files on disk that no queued or running task accounts for.
    /// With `delete`, they are removed as well.
    pub async fn sweep_orphans(&self, delete: bool) -> crate::error::Result<Vec<PartialFile>> {
        let config = &self.inner.config;
        let files = scan_partial_files(config.download_dir(), &config.file_extension).await?;
        let snapshot = self.inner.store.snapshot();
        let orphans: Vec<PartialFile> = files
            .into_iter()
            .filter(|file| !snapshot.is_queued(&file.key) && !self.inner.registry.is_running(&file.key))
            .collect();

        if delete {
            for orphan in &orphans {
                remove_partial(&orphan.path).await?;
                info!(key = %orphan.key, bytes = orphan.length, "orphaned download deleted");
            }
        }
        Ok(orphans)
    }
}

impl Inner {
    async fn run_job(&self, entry: CatalogEntry, token: StartToken) {
        let key = token.key().clone();
        let path = self.config.file_path(&key);

        self.execute(&entry, &key, &path, token.cancel_token()).await;
        debug!(%key, status = %self.store.status_of(&key), "download job exited");

        // Removed while failing or installing, past the point where cancellation is seen.
        if self.registry.has_deletion_intent(&key) {
            self.discard(&key, &path).await;
        }
        if self.registry.finish(&key) {
            warn!(%key, "removal raced with job exit");
            if let BeginOutcome::Started(token) = self.registry.try_begin(&key) {
                self.run_removal(token).await;
            }
        }
    }

    /// Delete the file of an idle task while holding its registry slot.
    async fn run_removal(&self, token: StartToken) {
        let key = token.key();
        match remove_partial(&self.config.file_path(key)).await {
            Ok(true) => debug!(%key, "download file deleted"),
            Ok(false) => {}
            Err(e) => error!(%key, "failed to delete download file: {}", e),
        }
        self.registry.finish(key);
    }

    async fn execute(&self, entry: &CatalogEntry, key: &TaskKey, path: &Path, cancel: &CancellationToken) {
        let url = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            url = self.resolver.resolve(key) => Some(url),
        };

        let outcome = match url {
            None => TransferOutcome::Cancelled,
            Some(Err(e)) => TransferOutcome::Failed(e),
            Some(Ok(url)) if url.trim().is_empty() => {
                TransferOutcome::Failed(DownloadError::UrlUnavailable(format!("blank url for {}", key)))
            }
            Some(Ok(url)) => {
                let store = self.store.clone();
                let progress_key = key.clone();
                self.engine
                    .transfer(&url, path, true, cancel, move |percent| store.set_progress(&progress_key, percent))
                    .await
            }
        };

        match outcome {
            TransferOutcome::Cancelled => self.on_cancelled(key, path).await,
            TransferOutcome::Failed(e) => self.on_failed(key, &e),
            TransferOutcome::Completed(report) => self.on_transferred(entry, key, report).await,
        }
    }

    async fn on_cancelled(&self, key: &TaskKey, path: &Path) {
        let deletion = self.registry.take_deletion_intent(key);
        if deletion {
            if let Err(e) = remove_partial(path).await {
                error!(%key, "failed to delete cancelled download: {}", e);
            }
            self.store.remove_task(key);
            info!(%key, "download discarded");
        } else {
            self.store.transition(key, DownloadStatus::Paused);
            info!(%key, "download paused");
        }
    }

    fn on_failed(&self, key: &TaskKey, e: &DownloadError) {
        warn!(%key, "download failed: {}", e);
        self.store.fail(key, &e.to_string());
    }

    /// Task was removed while its job was running; drop what it produced.
    async fn discard(&self, key: &TaskKey, path: &Path) {
        self.registry.take_deletion_intent(key);
        if let Err(e) = remove_partial(path).await {
            error!(%key, "failed to delete removed download: {}", e);
        }
    }

    async fn on_transferred(&self, entry: &CatalogEntry, key: &TaskKey, report: TransferReport) {
        if !self.store.transition(key, DownloadStatus::Verifying) {
            self.discard(key, &report.path).await;
            return;
        }

        let verify = FileVerify::from(entry.checksum);
        if let Err(e) = file_validate(&verify, &report.path, Some(report.total_bytes)).await {
            if let DownloadError::FileVerify(_) = e {
                let _ = remove_partial(&report.path).await;
            }
            self.on_failed(key, &e);
            return;
        }

        if !self.store.transition(key, DownloadStatus::Installing) {
            self.discard(key, &report.path).await;
            return;
        }

        info!(%key, path = %report.path.display(), "installing");
        if let Err(e) = self.installer.install(&report.path, key).await {
            let e = match e {
                DownloadError::Install(_) => e,
                other => DownloadError::Install(other.to_string()),
            };
            self.on_failed(key, &e);
            return;
        }

        match self.store.complete_install(key) {
            Some(install_state) => info!(%key, %install_state, "installed"),
            None => warn!(%key, "installed but task was no longer tracked"),
        }
    }
}
