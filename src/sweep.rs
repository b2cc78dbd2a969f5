use std::path::{Path, PathBuf};
use tokio::fs;
use crate::task_key::TaskKey;

/// A download file found on disk whose name maps back to a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFile {
    pub key: TaskKey,
    pub path: PathBuf,
    pub length: u64,
}

/// List every `<artifact>_<version>.<extension>` file directly under `dir`.
pub async fn scan_partial_files(dir: &Path, extension: &str) -> crate::error::Result<Vec<PartialFile>> {
    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let key = match path.file_stem().and_then(|s| s.to_str()).and_then(TaskKey::from_file_stem) {
            Some(key) => key,
            None => continue,
        };
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        files.push(PartialFile {
            key,
            path,
            length: metadata.len(),
        });
    }
    files.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(files)
}

#[cfg(test)]
mod test {
    use crate::task_key::TaskKey;
    use super::scan_partial_files;

    #[tokio::test]
    async fn test_scan_partial_files() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path();
        tokio::fs::write(dir.join("beta_2.apk"), vec![0u8; 10]).await.unwrap();
        tokio::fs::write(dir.join("alpha_1.apk"), vec![0u8; 4]).await.unwrap();
        tokio::fs::write(dir.join("alpha_1.tmp"), b"x").await.unwrap();
        tokio::fs::write(dir.join("notes.apk"), b"x").await.unwrap();
        tokio::fs::create_dir(dir.join("gamma_3.apk")).await.unwrap();

        let files = scan_partial_files(dir, "apk").await.unwrap();
        let keys: Vec<TaskKey> = files.iter().map(|f| f.key.clone()).collect();
        assert_eq!(keys, vec![TaskKey::new("alpha", 1), TaskKey::new("beta", 2)]);
        assert_eq!(files[0].length, 4);
        assert_eq!(files[1].path, dir.join("beta_2.apk"));
    }
}
