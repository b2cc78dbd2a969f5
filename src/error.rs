use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("IdentityMissing: {0} has no version id")]
    IdentityMissing(String),
    #[error("RangeUnsupported: server rejected resume from byte {0}")]
    RangeUnsupported(u64),
    #[error("UrlUnavailable: {0}")]
    UrlUnavailable(String),
    #[error("Request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Status: server answered {0}")]
    Status(u16),
    #[error("ShortRead: expected {expected} bytes, received {received}")]
    ShortRead { expected: u64, received: u64 },
    #[error("Timeout: no data for {0:?}")]
    Timeout(std::time::Duration),
    #[error("Io: {0}")]
    Io(#[from] std::io::Error),
    #[error("FileVerify: {0}")]
    FileVerify(String),
    #[error("Install: {0}")]
    Install(String),
    #[error("Config: {0}")]
    Config(String),
}

impl DownloadError {
    /// Errors after which the task lands in `Paused` and the user may resume.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DownloadError::IdentityMissing(_) | DownloadError::Config(_))
    }
}

pub type Result<T> = core::result::Result<T, DownloadError>;
