use std::path::Path;
use async_trait::async_trait;
use crate::task_key::TaskKey;

/// Turns a task identity into a short-lived download URL. Signing and
/// authentication of the control-plane call happen behind this trait.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    async fn resolve(&self, key: &TaskKey) -> crate::error::Result<String>;
}

/// Installs a verified package file.
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, path: &Path, key: &TaskKey) -> crate::error::Result<()>;

    /// Version code of the artifact currently installed on this device.
    fn installed_version_code(&self, _artifact_id: &str) -> Option<i64> {
        None
    }
}
