use std::sync::Arc;

use tokio::sync::RwLock;

use super::types::Sample;

/// Append-only, insertion-ordered sample history shared between the sampling
/// loop (single writer) and any number of readers. Cloning shares the store.
#[derive(Clone, Default)]
pub struct HistoryStore {
    samples: Arc<RwLock<Vec<Sample>>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, sample: Sample) {
        self.samples.write().await.push(sample);
    }

    pub async fn latest(&self) -> Option<Sample> {
        self.samples.read().await.last().cloned()
    }

    /// Point-in-time copy; later appends do not show up in it.
    pub async fn snapshot(&self) -> Vec<Sample> {
        self.samples.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.samples.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.samples.read().await.is_empty()
    }
}
