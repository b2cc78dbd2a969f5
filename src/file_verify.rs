use std::path::Path;
use xxhash_rust::xxh64;
use tokio::io::{AsyncReadExt, BufReader};
use crate::error::DownloadError;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum FileVerify {
    None,
    #[allow(non_camel_case_types)]
    xxHash(u64),
}

impl From<Option<u64>> for FileVerify {
    fn from(checksum: Option<u64>) -> Self {
        match checksum {
            Some(value) => FileVerify::xxHash(value),
            None => FileVerify::None,
        }
    }
}

pub async fn calculate_file_xxhash(file_path: impl AsRef<Path>, seed: u64) -> crate::error::Result<u64> {
    let file = tokio::fs::File::open(file_path.as_ref()).await?;
    let mut reader = BufReader::new(file);
    let mut hasher = xxh64::Xxh64::new(seed);
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[0..bytes_read]);
    }
    Ok(hasher.digest())
}

/// Check a finished download against its expected length and, optionally, its hash.
pub async fn file_validate(
    file_verify: &FileVerify,
    file_path: impl AsRef<Path>,
    expected_length: Option<u64>,
) -> crate::error::Result<()> {
    let file_path = file_path.as_ref();
    let length = tokio::fs::metadata(file_path).await?.len();
    if let Some(expected) = expected_length {
        if length != expected {
            return Err(DownloadError::FileVerify(format!("length {} != {}", length, expected)));
        }
    }

    match file_verify {
        FileVerify::None => Ok(()),
        FileVerify::xxHash(value) => {
            let hash = calculate_file_xxhash(file_path, 0).await?;
            if hash != *value {
                return Err(DownloadError::FileVerify(format!("xxh64 {:016x} != {:016x}", hash, value)));
            }
            Ok(())
        }
    }
}
