use std::fmt::{Display, Formatter};

/// Identity of one tracked download: an artifact at a specific version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub artifact_id: String,
    pub version_id: i64,
}

impl TaskKey {
    pub fn new(artifact_id: impl Into<String>, version_id: i64) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            version_id,
        }
    }

    /// Deterministic file stem, `<artifact>_<version>`, with path separators replaced.
    pub fn file_stem(&self) -> String {
        let artifact: String = self.artifact_id
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '-',
                c => c,
            })
            .collect();
        format!("{}_{}", artifact, self.version_id)
    }

    /// Inverse of [`TaskKey::file_stem`] for stems whose artifact needed no escaping.
    pub fn from_file_stem(stem: &str) -> Option<TaskKey> {
        let (artifact, version) = stem.rsplit_once('_')?;
        if artifact.is_empty() {
            return None;
        }
        let version_id = version.parse().ok()?;
        Some(TaskKey::new(artifact, version_id))
    }
}

impl Display for TaskKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.artifact_id, self.version_id)
    }
}
