use crate::error::{IndexerError, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// Turns a source identifier into a local directory ready to be scanned.
///
/// Implementations may clone or download; failures should surface as
/// [`IndexerError::SourceUnavailable`].
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn acquire(&self, identifier: &str) -> Result<PathBuf>;
}

/// Identifier is a path to an existing local directory
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDirectorySource;

#[async_trait]
impl SourceProvider for LocalDirectorySource {
    async fn acquire(&self, identifier: &str) -> Result<PathBuf> {
        let path = PathBuf::from(identifier);
        let meta = tokio::fs::metadata(&path).await.map_err(|err| {
            IndexerError::SourceUnavailable(format!("{}: {err}", path.display()))
        })?;
        if !meta.is_dir() {
            return Err(IndexerError::SourceUnavailable(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        Ok(tokio::fs::canonicalize(&path).await.unwrap_or(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_directory_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let ok = LocalDirectorySource
            .acquire(tmp.path().to_str().unwrap())
            .await
            .unwrap();
        assert!(ok.is_dir());

        let missing = tmp.path().join("missing");
        let err = LocalDirectorySource
            .acquire(missing.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::SourceUnavailable(_)));

        let file = tmp.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        let err = LocalDirectorySource
            .acquire(file.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
