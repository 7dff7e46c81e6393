use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};

/// Default window size in words
pub const DEFAULT_WINDOW_WORDS: usize = 500;

/// Default overlap between consecutive windows in words
pub const DEFAULT_OVERLAP_WORDS: usize = 100;

/// Configuration for word-window chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Window size `W` in words
    pub window_words: usize,

    /// Words shared by consecutive windows (`0 <= O < W`)
    pub overlap_words: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            window_words: DEFAULT_WINDOW_WORDS,
            overlap_words: DEFAULT_OVERLAP_WORDS,
        }
    }
}

impl ChunkerConfig {
    #[must_use]
    pub const fn new(window_words: usize, overlap_words: usize) -> Self {
        Self {
            window_words,
            overlap_words,
        }
    }

    /// Distance between the starts of consecutive windows.
    ///
    /// Clamped to at least one word so that chunking always makes progress,
    /// even for a pathological `overlap_words >= window_words`.
    #[must_use]
    pub const fn step(&self) -> usize {
        let step = self.window_words.saturating_sub(self.overlap_words);
        if step == 0 {
            1
        } else {
            step
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.window_words == 0 {
            return Err(ChunkerError::invalid_config("window_words must be > 0"));
        }

        if self.overlap_words >= self.window_words {
            return Err(ChunkerError::invalid_config(format!(
                "overlap_words ({}) must be smaller than window_words ({})",
                self.overlap_words, self.window_words
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = ChunkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_words, 500);
        assert_eq!(config.overlap_words, 100);
        assert_eq!(config.step(), 400);
    }

    #[test]
    fn test_config_validation() {
        assert!(ChunkerConfig::new(0, 0).validate().is_err());
        assert!(ChunkerConfig::new(10, 10).validate().is_err());
        assert!(ChunkerConfig::new(10, 25).validate().is_err());

        assert!(ChunkerConfig::new(1, 0).validate().is_ok());
        assert!(ChunkerConfig::new(10, 9).validate().is_ok());
    }

    #[test]
    fn step_is_clamped_to_one() {
        assert_eq!(ChunkerConfig::new(5, 5).step(), 1);
        assert_eq!(ChunkerConfig::new(5, 50).step(), 1);
        assert_eq!(ChunkerConfig::new(0, 0).step(), 1);
    }

    #[test]
    fn config_deserializes_from_json() {
        let config: ChunkerConfig =
            serde_json::from_str(r#"{"window_words": 64, "overlap_words": 8}"#).unwrap();
        assert_eq!(config, ChunkerConfig::new(64, 8));
    }
}
