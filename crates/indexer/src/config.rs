use crate::error::{IndexerError, Result};
use crate::scanner::{ScanOptions, DEFAULT_EXTENSIONS, DEFAULT_IGNORED_DIRS};
use repolens_chunker::{ChunkerConfig, DEFAULT_OVERLAP_WORDS, DEFAULT_WINDOW_WORDS};
use repolens_vector_store::{EmbeddingOptions, IndexPaths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File looked up in the working directory when no config path is given
pub const CONFIG_FILE_NAME: &str = "repolens.toml";

const ENV_STORE_DIR: &str = "REPOLENS_STORE_DIR";

/// Pipeline configuration.
///
/// Every field has a default, so an empty TOML file is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub allowed_extensions: Vec<String>,
    pub ignored_dirs: Vec<String>,
    pub chunk_window: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// Where `vectors.bin` and `metadata.json` live; `None` keeps the index in memory
    pub store_dir: Option<PathBuf>,
    pub embed_batch_size: usize,
    pub acquire_timeout_secs: u64,
    pub respect_gitignore: bool,
    pub max_file_bytes: Option<u64>,
    pub embedding: EmbeddingOptions,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(ToString::to_string).collect(),
            chunk_window: DEFAULT_WINDOW_WORDS,
            chunk_overlap: DEFAULT_OVERLAP_WORDS,
            top_k: 5,
            store_dir: None,
            embed_batch_size: 64,
            acquire_timeout_secs: 120,
            respect_gitignore: false,
            max_file_bytes: None,
            embedding: EmbeddingOptions::default(),
        }
    }
}

impl RagConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            IndexerError::invalid_config(format!("read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Resolve the effective config: an explicit file, else `repolens.toml`
    /// in the working directory when present, else defaults; then
    /// environment overrides; then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let local = Path::new(CONFIG_FILE_NAME);
                if local.is_file() {
                    log::debug!("Using config from ./{CONFIG_FILE_NAME}");
                    Self::load_from_file(local)?
                } else {
                    Self::default()
                }
            }
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var(ENV_STORE_DIR) {
            if !dir.trim().is_empty() {
                self.store_dir = Some(PathBuf::from(dir));
            }
        }
        self.embedding = self.embedding.with_env_overrides()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunker_config().validate()?;

        if self.top_k == 0 {
            return Err(IndexerError::invalid_config("top_k must be > 0"));
        }
        if self.embed_batch_size == 0 {
            return Err(IndexerError::invalid_config("embed_batch_size must be > 0"));
        }
        if self
            .allowed_extensions
            .iter()
            .all(|ext| ext.trim().trim_start_matches('.').is_empty())
        {
            return Err(IndexerError::invalid_config(
                "allowed_extensions must name at least one extension",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig::new(self.chunk_window, self.chunk_overlap)
    }

    #[must_use]
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            allowed_extensions: self.allowed_extensions.clone(),
            ignored_dirs: self.ignored_dirs.clone(),
            respect_gitignore: self.respect_gitignore,
            max_file_bytes: self.max_file_bytes,
        }
    }

    #[must_use]
    pub fn index_paths(&self) -> Option<IndexPaths> {
        self.store_dir.as_deref().map(IndexPaths::in_dir)
    }

    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use repolens_vector_store::EmbeddingMode;

    #[test]
    fn defaults_are_valid() {
        let config = RagConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunker_config(), ChunkerConfig::new(500, 100));
        assert_eq!(config.top_k, 5);
        assert!(config.index_paths().is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = RagConfig::from_toml_str(
            r#"
chunk_window = 64
chunk_overlap = 8
store_dir = "/var/lib/repolens"
allowed_extensions = [".rs", "md"]

[embedding]
mode = "stub"
"#,
        )
        .unwrap();

        assert_eq!(config.chunker_config(), ChunkerConfig::new(64, 8));
        assert_eq!(config.top_k, 5);
        assert_eq!(config.allowed_extensions, vec![".rs", "md"]);
        assert_eq!(config.embedding.mode, EmbeddingMode::Stub);
        assert_eq!(config.embedding.model_id, "all-minilm-l6-v2");
        assert_eq!(
            config.index_paths().unwrap(),
            IndexPaths::in_dir(Path::new("/var/lib/repolens"))
        );
    }

    #[test]
    fn validation_rejects_bad_values() {
        let cases = [
            RagConfig {
                chunk_window: 0,
                chunk_overlap: 0,
                ..RagConfig::default()
            },
            RagConfig {
                chunk_window: 100,
                chunk_overlap: 100,
                ..RagConfig::default()
            },
            RagConfig {
                top_k: 0,
                ..RagConfig::default()
            },
            RagConfig {
                embed_batch_size: 0,
                ..RagConfig::default()
            },
            RagConfig {
                allowed_extensions: vec![".".to_string()],
                ..RagConfig::default()
            },
        ];
        for config in cases {
            let err = config.validate().unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidConfig, "{config:?}");
        }
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = RagConfig::from_toml_str("chunk_window = \"big\"").unwrap_err();
        assert!(matches!(err, IndexerError::ConfigError(_)));
    }

    #[test]
    fn load_from_missing_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = RagConfig::load_from_file(&tmp.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, IndexerError::InvalidConfig(_)));
    }
}
