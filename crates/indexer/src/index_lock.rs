use crate::{IndexerError, Result};
use fs2::FileExt;
use repolens_vector_store::lock_path_for_store;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    /// Ingest: build, save and swap
    Write,
    /// Restore: read both artifacts of one save
    Read,
}

impl LockMode {
    const fn label(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Read => "read",
        }
    }
}

/// Cross-process lock on a store directory, released on drop
pub(crate) struct IndexLock {
    file: std::fs::File,
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Exclusive lock held while an index is built and saved
pub(crate) async fn acquire_index_write_lock(store_dir: &Path) -> Result<IndexLock> {
    tokio::fs::create_dir_all(store_dir).await?;
    acquire(store_dir, LockMode::Write).await
}

/// Shared lock held while a saved index is loaded. The store directory must exist.
pub(crate) async fn acquire_index_read_lock(store_dir: &Path) -> Result<IndexLock> {
    acquire(store_dir, LockMode::Read).await
}

async fn acquire(store_dir: &Path, mode: LockMode) -> Result<IndexLock> {
    let path = lock_path_for_store(store_dir);

    let lock = tokio::task::spawn_blocking(move || -> Result<IndexLock> {
        use std::fs::OpenOptions;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| {
                IndexerError::IoError(std::io::Error::new(
                    err.kind(),
                    format!("open index lock {}: {err}", path.display()),
                ))
            })?;

        let start = Instant::now();
        let locked = match mode {
            LockMode::Write => file.lock_exclusive(),
            LockMode::Read => file.lock_shared(),
        };
        locked.map_err(|err| {
            IndexerError::IoError(std::io::Error::new(
                err.kind(),
                format!("acquire index {} lock {}: {err}", mode.label(), path.display()),
            ))
        })?;
        log::debug!(
            "Acquired index {} lock {} after {} ms",
            mode.label(),
            path.display(),
            start.elapsed().as_millis()
        );

        Ok(IndexLock { file })
    })
    .await
    .map_err(|err| {
        IndexerError::IoError(std::io::Error::other(format!("join index lock task: {err}")))
    })??;

    Ok(lock)
}
