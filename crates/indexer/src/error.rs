use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("No eligible documents found under {}", root.display())]
    EmptyRepository { root: PathBuf },

    #[error("No repository has been ingested yet; run an ingest first")]
    NotIngested,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Answer generation failed: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Chunker error: {0}")]
    ChunkerError(#[from] repolens_chunker::ChunkerError),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] repolens_vector_store::VectorStoreError),

    #[error("Config parse error: {0}")]
    ConfigError(#[from] toml::de::Error),
}

/// Coarse classification callers can branch on without matching every variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceUnavailable,
    EmptyRepository,
    NotIngested,
    DimensionMismatch,
    IndexNotFound,
    CorruptIndex,
    Embedding,
    InvalidConfig,
    Generation,
    Io,
}

impl IndexerError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        use repolens_vector_store::VectorStoreError as Vs;

        match self {
            Self::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            Self::EmptyRepository { .. } => ErrorKind::EmptyRepository,
            Self::NotIngested => ErrorKind::NotIngested,
            Self::InvalidConfig(_) | Self::ChunkerError(_) | Self::ConfigError(_) => {
                ErrorKind::InvalidConfig
            }
            Self::Generation(_) => ErrorKind::Generation,
            Self::IoError(_) => ErrorKind::Io,
            Self::VectorStoreError(inner) => match inner {
                Vs::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
                Vs::IndexNotFound { .. } => ErrorKind::IndexNotFound,
                Vs::CorruptIndex(_) | Vs::SerializationError(_) => ErrorKind::CorruptIndex,
                Vs::EmbeddingError(_) => ErrorKind::Embedding,
                Vs::IoError(_) => ErrorKind::Io,
            },
        }
    }

    /// Whether repeating the same call might succeed.
    ///
    /// Only source acquisition and transient IO qualify; bad input,
    /// configuration and corrupt state fail the same way every time.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        use repolens_vector_store::VectorStoreError as Vs;

        let io = match self {
            Self::SourceUnavailable(_) => return true,
            Self::IoError(err) | Self::VectorStoreError(Vs::IoError(err)) => err,
            _ => return false,
        };
        matches!(
            io.kind(),
            std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::WouldBlock
        )
    }

    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_vector_store::VectorStoreError;

    #[test]
    fn kinds_distinguish_store_failures() {
        let err: IndexerError = VectorStoreError::DimensionMismatch {
            expected: 384,
            actual: 3,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert!(!err.is_retryable());

        let err: IndexerError = VectorStoreError::CorruptIndex("bad header".into()).into();
        assert_eq!(err.kind(), ErrorKind::CorruptIndex);
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(IndexerError::SourceUnavailable("clone timed out".into()).is_retryable());
        assert!(
            IndexerError::from(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_retryable()
        );
        assert!(
            !IndexerError::from(std::io::Error::from(std::io::ErrorKind::NotFound)).is_retryable()
        );
        assert!(!IndexerError::NotIngested.is_retryable());
        assert!(!IndexerError::EmptyRepository {
            root: PathBuf::from("/repo")
        }
        .is_retryable());
    }
}
