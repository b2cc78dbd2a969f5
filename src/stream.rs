use std::path::Path;
use tokio::fs;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Write side of one transfer attempt: either continues an existing
/// partial file or truncates it and starts at byte 0.
pub struct Stream {
    file: File,
    written: u64,
}

impl Stream {
    pub async fn open(path: &Path, append: bool) -> crate::error::Result<Stream> {
        if let Some(parent) = path.parent() {
            if parent.symlink_metadata().is_err() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .await?;
        Ok(Stream {
            file,
            written: 0,
        })
    }

    pub async fn write_async(&mut self, buffer: &[u8]) -> crate::error::Result<()> {
        self.file.write_all(buffer).await?;
        self.written += buffer.len() as u64;
        Ok(())
    }

    pub async fn flush_async(&mut self) -> crate::error::Result<()> {
        self.file.flush().await?;
        Ok(())
    }

    /// Bytes written through this stream, excluding what was already on disk.
    pub fn written(&self) -> u64 {
        self.written
    }
}

/// Length of the partial file at `path`, 0 when absent.
pub async fn partial_length(path: &Path) -> u64 {
    match fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => 0,
    }
}

/// Delete `path`, treating an already missing file as success.
pub async fn remove_partial(path: &Path) -> crate::error::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
