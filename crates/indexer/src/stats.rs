use serde::{Deserialize, Serialize};

/// Statistics about one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Documents that made it into the index
    pub files_loaded: usize,

    /// Chunks embedded and stored
    pub chunks_created: usize,

    /// Eligible files dropped because they could not be read
    pub files_skipped: usize,

    /// Time taken in milliseconds
    pub time_ms: u64,
}
