use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use reqwest::Client;
use crate::error::DownloadError;
use crate::task_key::TaskKey;

#[derive(Debug, Clone)]
pub struct DownloadConfiguration {
    pub download_dir: PathBuf,
    pub file_extension: String,
    pub connect_timeout: Duration,
    /// Upper bound on one whole request, body included.
    pub request_timeout: Duration,
    /// Longest silence tolerated between two body chunks.
    pub read_timeout: Duration,
    pub user_agent: String,
}

pub struct DownloadConfigurationBuilder {
    config: DownloadConfiguration,
    download_dir: Option<PathBuf>,
    create_dir: bool,
}

impl DownloadConfigurationBuilder {
    fn new(config: DownloadConfiguration) -> Self {
        Self {
            config,
            download_dir: None,
            create_dir: false,
        }
    }

    pub fn set_download_dir(mut self, dir: impl Into<PathBuf>) -> DownloadConfigurationBuilder {
        self.download_dir = Some(dir.into());
        self
    }

    pub fn set_file_extension(mut self, extension: impl Into<String>) -> DownloadConfigurationBuilder {
        self.config.file_extension = extension.into();
        self
    }

    pub fn set_connect_timeout(mut self, timeout: Duration) -> DownloadConfigurationBuilder {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn set_request_timeout(mut self, timeout: Duration) -> DownloadConfigurationBuilder {
        self.config.request_timeout = timeout;
        self
    }

    pub fn set_read_timeout(mut self, timeout: Duration) -> DownloadConfigurationBuilder {
        self.config.read_timeout = timeout;
        self
    }

    pub fn set_user_agent(mut self, user_agent: impl Into<String>) -> DownloadConfigurationBuilder {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn create_dir(mut self, create: bool) -> DownloadConfigurationBuilder {
        self.create_dir = create;
        self
    }

    pub fn build(self) -> crate::error::Result<DownloadConfiguration> {
        self.validate()
    }

    fn validate(mut self) -> crate::error::Result<DownloadConfiguration> {
        let dir = match self.download_dir.take() {
            Some(dir) => dir,
            None => return Err(DownloadError::Config("download dir not set".to_string())),
        };

        if !dir.is_dir() {
            if !self.create_dir {
                return Err(DownloadError::Config(format!("{} is not a directory", dir.display())));
            }
            fs::create_dir_all(&dir)?;
        }

        if self.config.file_extension.is_empty() || self.config.file_extension.contains('.') {
            return Err(DownloadError::Config(format!("invalid file extension {:?}", self.config.file_extension)));
        }

        if self.config.read_timeout.is_zero() || self.config.connect_timeout.is_zero() {
            return Err(DownloadError::Config("timeouts must be non-zero".to_string()));
        }

        self.config.download_dir = dir;
        Ok(self.config)
    }
}

impl DownloadConfiguration {
    pub fn new() -> DownloadConfigurationBuilder {
        let config = DownloadConfiguration {
            download_dir: PathBuf::new(),
            file_extension: "apk".to_string(),
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30 * 60),
            read_timeout: Duration::from_secs(30),
            user_agent: concat!("store-downloader/", env!("CARGO_PKG_VERSION")).to_string(),
        };
        DownloadConfigurationBuilder::new(config)
    }

    /// Where the partial or complete file for `key` lives.
    pub fn file_path(&self, key: &TaskKey) -> PathBuf {
        self.download_dir.join(format!("{}.{}", key.file_stem(), self.file_extension))
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn build_client(&self) -> crate::error::Result<Client> {
        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .user_agent(self.user_agent.as_str())
            .build()?;
        Ok(client)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;
    use crate::error::DownloadError;
    use crate::task_key::TaskKey;
    use super::DownloadConfiguration;

    #[test]
    fn test_build_requires_dir() {
        let result = DownloadConfiguration::new().build();
        assert!(matches!(result, Err(DownloadError::Config(_))));
    }

    #[test]
    fn test_build_creates_dir() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("nested").join("downloads");

        let missing = DownloadConfiguration::new().set_download_dir(&dir).build();
        assert!(matches!(missing, Err(DownloadError::Config(_))));

        let config = DownloadConfiguration::new()
            .set_download_dir(&dir)
            .create_dir(true)
            .build()
            .unwrap();
        assert!(dir.is_dir());
        assert_eq!(config.download_dir(), dir.as_path());
    }

    #[test]
    fn test_file_path_is_deterministic() {
        let temp = tempfile::tempdir().unwrap();
        let config = DownloadConfiguration::new()
            .set_download_dir(temp.path())
            .set_file_extension("pkg")
            .build()
            .unwrap();
        let key = TaskKey::new("demo", 12);
        assert_eq!(config.file_path(&key), temp.path().join("demo_12.pkg"));
        assert_eq!(config.file_path(&key), config.file_path(&key.clone()));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let temp = tempfile::tempdir().unwrap();
        let result = DownloadConfiguration::new()
            .set_download_dir(temp.path())
            .set_read_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(DownloadError::Config(_))));
    }
}
