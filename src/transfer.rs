use std::path::{Path, PathBuf};
use std::time::Duration;
use futures::StreamExt;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::download_configuration::DownloadConfiguration;
use crate::error::DownloadError;
use crate::remote_file::RemoteFileInfo;
use crate::stream::{partial_length, remove_partial, Stream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub path: PathBuf,
    /// Size of the file on disk once the transfer finished.
    pub total_bytes: u64,
    /// Offset the server agreed to continue from, 0 for a full download.
    pub resumed_from: u64,
}

#[derive(Debug)]
pub enum TransferOutcome {
    Completed(TransferReport),
    Cancelled,
    Failed(DownloadError),
}

impl TransferOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TransferOutcome::Completed(_))
    }
}

enum Attempt {
    Done(TransferOutcome),
    /// The server refused or could not place a ranged request starting here.
    RangeRejected(u64),
}

/// One resumable HTTP GET into one destination file.
#[derive(Clone)]
pub struct TransferEngine {
    client: Client,
    read_timeout: Duration,
}

impl TransferEngine {
    pub fn new(client: Client, read_timeout: Duration) -> Self {
        Self {
            client,
            read_timeout,
        }
    }

    pub fn from_config(config: &DownloadConfiguration) -> crate::error::Result<Self> {
        Ok(Self::new(config.build_client()?, config.read_timeout))
    }

    /// Download `url` into `destination`, continuing an existing partial file when
    /// `resume_allowed`. `on_progress` receives whole percentages whenever they change.
    pub async fn transfer<F>(
        &self,
        url: &str,
        destination: &Path,
        resume_allowed: bool,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> TransferOutcome
        where F: Fn(u8) + Send + Sync
    {
        let mut resume_allowed = resume_allowed;
        let mut fell_back = false;
        loop {
            match self.attempt(url, destination, resume_allowed, cancel, &on_progress).await {
                Attempt::Done(outcome) => return outcome,
                Attempt::RangeRejected(offset) => {
                    if fell_back {
                        return TransferOutcome::Failed(DownloadError::RangeUnsupported(offset));
                    }
                    warn!(path = %destination.display(), offset, "range rejected, restarting full download");
                    if let Err(e) = remove_partial(destination).await {
                        return TransferOutcome::Failed(e);
                    }
                    fell_back = true;
                    resume_allowed = false;
                }
            }
        }
    }

    async fn attempt<F>(
        &self,
        url: &str,
        destination: &Path,
        resume_allowed: bool,
        cancel: &CancellationToken,
        on_progress: &F,
    ) -> Attempt
        where F: Fn(u8) + Send + Sync
    {
        let offset = match resume_allowed {
            true => partial_length(destination).await,
            false => 0,
        };

        let mut request = self.client.get(url);
        if offset > 0 {
            debug!(path = %destination.display(), offset, "requesting resume");
            request = request.header(RANGE, format!("bytes={}-", offset));
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Attempt::Done(TransferOutcome::Cancelled),
            response = request.send() => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => return Attempt::Done(TransferOutcome::Failed(e.into())),
        };

        let info = RemoteFileInfo::new(response.status(), response.headers());
        if info.status == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
            return Attempt::RangeRejected(offset);
        }
        if !info.status.is_success() {
            return Attempt::Done(TransferOutcome::Failed(DownloadError::Status(info.status.as_u16())));
        }

        let resumed = offset > 0 && info.honors_resume_from(offset);
        if offset > 0 && !resumed {
            if info.status == StatusCode::PARTIAL_CONTENT {
                // A fragment we cannot place at `offset`.
                return Attempt::RangeRejected(offset);
            }
            warn!(path = %destination.display(), offset, status = %info.status, "server ignored range, rewriting from 0");
        }

        let kept = if resumed { offset } else { 0 };
        let total = info.expected_total(kept);
        info!(path = %destination.display(), kept, total = ?total, "transfer started");

        let mut stream = match Stream::open(destination, resumed).await {
            Ok(stream) => stream,
            Err(e) => return Attempt::Done(TransferOutcome::Failed(e)),
        };

        let mut progress = Progress::new(total);
        progress.advance(kept, on_progress);

        let mut body = response.bytes_stream();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = timeout(self.read_timeout, body.next()) => Some(next),
            };
            let chunk = match next {
                None => return Attempt::Done(cancelled(&mut stream).await),
                Some(Err(_)) => return Attempt::Done(TransferOutcome::Failed(DownloadError::Timeout(self.read_timeout))),
                Some(Ok(None)) => break,
                Some(Ok(Some(Err(e)))) => {
                    let _ = stream.flush_async().await;
                    return Attempt::Done(TransferOutcome::Failed(e.into()));
                }
                Some(Ok(Some(Ok(chunk)))) => chunk,
            };

            if let Err(e) = stream.write_async(&chunk).await {
                return Attempt::Done(TransferOutcome::Failed(e));
            }
            progress.advance(chunk.len() as u64, on_progress);

            if cancel.is_cancelled() {
                return Attempt::Done(cancelled(&mut stream).await);
            }
        }

        if let Err(e) = stream.flush_async().await {
            return Attempt::Done(TransferOutcome::Failed(e));
        }

        let received = kept + stream.written();
        if let Some(expected) = total {
            if received < expected {
                return Attempt::Done(TransferOutcome::Failed(DownloadError::ShortRead { expected, received }));
            }
        }

        info!(path = %destination.display(), received, "transfer finished");
        Attempt::Done(TransferOutcome::Completed(TransferReport {
            path: destination.to_path_buf(),
            total_bytes: received,
            resumed_from: kept,
        }))
    }
}

async fn cancelled(stream: &mut Stream) -> TransferOutcome {
    // Keep what arrived so a later resume can continue from it.
    let _ = stream.flush_async().await;
    debug!(written = stream.written(), "transfer cancelled");
    TransferOutcome::Cancelled
}

struct Progress {
    total: Option<u64>,
    received: u64,
    last_percent: Option<u8>,
}

impl Progress {
    fn new(total: Option<u64>) -> Self {
        Self {
            total,
            received: 0,
            last_percent: None,
        }
    }

    fn advance<F: Fn(u8)>(&mut self, bytes: u64, on_progress: &F) {
        self.received += bytes;
        let total = match self.total {
            Some(total) if total > 0 => total,
            _ => return,
        };
        let percent = (self.received.saturating_mul(100) / total).min(100) as u8;
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            on_progress(percent);
        }
    }
}
