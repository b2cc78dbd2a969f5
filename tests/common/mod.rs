#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use wiremock::{Request, Respond, ResponseTemplate};
use store_downloader::{
    DownloadConfiguration, DownloadError, DownloadOrchestrator, Installer, StateStore, StoreSnapshot, TaskKey,
    UrlResolver,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Serves `body`, answering `Range: bytes=N-` with 206 and a matching Content-Range.
pub struct RangeResponder {
    pub body: Vec<u8>,
    pub delay: Option<Duration>,
}

impl RangeResponder {
    pub fn new(body: Vec<u8>) -> Self {
        Self { body, delay: None }
    }

    pub fn delayed(body: Vec<u8>, delay: Duration) -> Self {
        Self { body, delay: Some(delay) }
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let start = request
            .headers
            .get("range")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("bytes="))
            .and_then(|value| value.strip_suffix('-'))
            .and_then(|value| value.parse::<usize>().ok());

        let template = match start {
            Some(start) if start >= self.body.len() => ResponseTemplate::new(416),
            Some(start) => ResponseTemplate::new(206)
                .insert_header(
                    "content-range",
                    format!("bytes {}-{}/{}", start, self.body.len() - 1, self.body.len()),
                )
                .set_body_bytes(self.body[start..].to_vec()),
            None => ResponseTemplate::new(200).set_body_bytes(self.body.clone()),
        };
        match self.delay {
            Some(delay) => template.set_delay(delay),
            None => template,
        }
    }
}

pub fn range_header(request: &Request) -> Option<String> {
    request
        .headers
        .get("range")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

/// Resolves every key to `<base>/pkg/<artifact>_<version>`. Each call waits for
/// a permit, so tests can hold jobs in the resolving stage.
pub struct TestResolver {
    base: String,
    gate: Semaphore,
    calls: Mutex<Vec<TaskKey>>,
    blank: bool,
}

impl TestResolver {
    pub fn open(base: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            base: base.into(),
            gate: Semaphore::new(1024),
            calls: Mutex::new(Vec::new()),
            blank: false,
        })
    }

    pub fn gated(base: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            base: base.into(),
            gate: Semaphore::new(0),
            calls: Mutex::new(Vec::new()),
            blank: false,
        })
    }

    pub fn blank() -> Arc<Self> {
        Arc::new(Self {
            base: String::new(),
            gate: Semaphore::new(1024),
            calls: Mutex::new(Vec::new()),
            blank: true,
        })
    }

    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    pub fn calls(&self) -> Vec<TaskKey> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl UrlResolver for TestResolver {
    async fn resolve(&self, key: &TaskKey) -> store_downloader::Result<String> {
        self.calls.lock().push(key.clone());
        match self.gate.acquire().await {
            Ok(permit) => permit.forget(),
            Err(e) => return Err(DownloadError::UrlUnavailable(e.to_string())),
        }
        if self.blank {
            return Ok("  ".to_string());
        }
        Ok(format!("{}/pkg/{}", self.base, key.file_stem()))
    }
}

pub struct TestInstaller {
    installed: Mutex<Vec<(PathBuf, TaskKey)>>,
    codes: HashMap<String, i64>,
    gate: Semaphore,
    fail: bool,
}

impl TestInstaller {
    pub fn new() -> Arc<Self> {
        Self::build(false, 1024)
    }

    pub fn failing() -> Arc<Self> {
        Self::build(true, 1024)
    }

    pub fn gated() -> Arc<Self> {
        Self::build(false, 0)
    }

    pub fn with_codes(codes: &[(&str, i64)]) -> Arc<Self> {
        Arc::new(Self {
            installed: Mutex::new(Vec::new()),
            codes: codes.iter().map(|(artifact, code)| (artifact.to_string(), *code)).collect(),
            gate: Semaphore::new(1024),
            fail: false,
        })
    }

    fn build(fail: bool, permits: usize) -> Arc<Self> {
        Arc::new(Self {
            installed: Mutex::new(Vec::new()),
            codes: HashMap::new(),
            gate: Semaphore::new(permits),
            fail,
        })
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn installed(&self) -> Vec<(PathBuf, TaskKey)> {
        self.installed.lock().clone()
    }
}

#[async_trait]
impl Installer for TestInstaller {
    async fn install(&self, path: &Path, key: &TaskKey) -> store_downloader::Result<()> {
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        if self.fail {
            return Err(DownloadError::Install("package rejected".to_string()));
        }
        self.installed.lock().push((path.to_path_buf(), key.clone()));
        Ok(())
    }

    fn installed_version_code(&self, artifact_id: &str) -> Option<i64> {
        self.codes.get(artifact_id).copied()
    }
}

pub struct Harness {
    pub orchestrator: DownloadOrchestrator,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(resolver: Arc<dyn UrlResolver>, installer: Arc<dyn Installer>) -> Harness {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let config = DownloadConfiguration::new()
            .set_download_dir(dir.path())
            .set_read_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let store = Arc::new(StateStore::new());
        let orchestrator = DownloadOrchestrator::new(config, store, resolver, installer).unwrap();
        Harness { orchestrator, dir }
    }

    pub fn file_path(&self, key: &TaskKey) -> PathBuf {
        self.orchestrator.config().file_path(key)
    }

    pub async fn wait_for<F>(&self, what: &str, predicate: F) -> Arc<StoreSnapshot>
        where F: Fn(&StoreSnapshot) -> bool
    {
        let wait = async {
            loop {
                let snapshot = self.orchestrator.snapshot();
                if predicate(&snapshot) {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        match tokio::time::timeout(Duration::from_secs(10), wait).await {
            Ok(snapshot) => snapshot,
            Err(_) => panic!("timed out waiting for {}", what),
        }
    }

    pub async fn wait_idle(&self, key: &TaskKey) {
        let wait = async {
            while self.orchestrator.is_running(key) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        if tokio::time::timeout(Duration::from_secs(10), wait).await.is_err() {
            panic!("job for {} never finished", key);
        }
    }
}

pub async fn wait_until<F>(what: &str, predicate: F)
    where F: Fn() -> bool
{
    let wait = async {
        while !predicate() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(10), wait).await.is_err() {
        panic!("timed out waiting for {}", what);
    }
}
