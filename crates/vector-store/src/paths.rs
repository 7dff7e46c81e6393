use std::path::{Path, PathBuf};

pub const VECTORS_FILE_NAME: &str = "vectors.bin";
pub const METADATA_FILE_NAME: &str = "metadata.json";
pub const LOCK_FILE_NAME: &str = "index.lock";

pub const CACHE_DIR_NAME: &str = "repolens";

/// The two artifacts that make up one persisted index. They are always
/// written and read as a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub vectors: PathBuf,
    pub metadata: PathBuf,
}

impl IndexPaths {
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            vectors: dir.join(VECTORS_FILE_NAME),
            metadata: dir.join(METADATA_FILE_NAME),
        }
    }

    /// Returns the first artifact that does not exist on disk
    #[must_use]
    pub fn first_missing(&self) -> Option<&Path> {
        [&self.vectors, &self.metadata]
            .into_iter()
            .find(|path| !path.exists())
            .map(PathBuf::as_path)
    }
}

#[must_use]
pub fn lock_path_for_store(dir: &Path) -> PathBuf {
    dir.join(LOCK_FILE_NAME)
}

/// Default location for downloaded embedding models
#[must_use]
pub fn default_model_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join(CACHE_DIR_NAME)
        .join("models")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_missing_reports_each_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(tmp.path());
        assert_eq!(paths.first_missing(), Some(paths.vectors.as_path()));

        std::fs::write(&paths.vectors, b"x").unwrap();
        assert_eq!(paths.first_missing(), Some(paths.metadata.as_path()));

        std::fs::write(&paths.metadata, b"{}").unwrap();
        assert_eq!(paths.first_missing(), None);
    }
}
