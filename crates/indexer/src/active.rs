use repolens_vector_store::VectorIndex;
use std::sync::{Arc, PoisonError, RwLock};

/// The index queries currently read from.
///
/// Readers take a cheap `Arc` snapshot and drop the lock immediately, so a
/// query always sees one complete index even while a replacement is swapped in.
#[derive(Debug, Default)]
pub struct ActiveIndex {
    slot: RwLock<Option<Arc<VectorIndex>>>,
}

impl ActiveIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<VectorIndex>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `index` and return the one it replaced
    pub fn replace(&self, index: Arc<VectorIndex>) -> Option<Arc<VectorIndex>> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.replace(index)
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
