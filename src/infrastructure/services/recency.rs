//! Batched recency updates for entries served as semantic hits

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::domain::cache::{EntryHash, VectorIndex};

/// Hashes waiting to be touched; further hits are dropped while it is full
const QUEUE_CAPACITY: usize = 1024;
const MAX_BATCH: usize = 256;

/// Feeds hit entries to a single task that touches them in batches
///
/// Hits only enqueue a hash, so a burst of lookups costs at most one
/// in-flight index write instead of one task per hit. Recency is advisory:
/// when the queue is full the touch is skipped.
#[derive(Debug, Clone)]
pub struct RecencyRefresher {
    vector_index: Arc<dyn VectorIndex>,
    queue: Arc<OnceCell<mpsc::Sender<EntryHash>>>,
}

impl RecencyRefresher {
    pub fn new(vector_index: Arc<dyn VectorIndex>) -> Self {
        Self {
            vector_index,
            queue: Arc::new(OnceCell::new()),
        }
    }

    /// Queue `hash` for a recency update
    ///
    /// The worker task is started on first use, so this must run inside a
    /// Tokio runtime.
    pub fn refresh(&self, hash: EntryHash) {
        let queue = self.queue.get_or_init(|| self.start_worker());

        match queue.try_send(hash) {
            Ok(()) => {}
            Err(TrySendError::Full(hash)) => {
                debug!(hash = %hash, "Recency queue full, touch skipped");
            }
            Err(TrySendError::Closed(hash)) => {
                debug!(hash = %hash, "Recency worker stopped, touch skipped");
            }
        }
    }

    fn start_worker(&self) -> mpsc::Sender<EntryHash> {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(drain(Arc::clone(&self.vector_index), receiver));
        sender
    }
}

/// Runs until every sender is dropped
async fn drain(vector_index: Arc<dyn VectorIndex>, mut receiver: mpsc::Receiver<EntryHash>) {
    let mut batch = Vec::with_capacity(MAX_BATCH);

    while receiver.recv_many(&mut batch, MAX_BATCH).await > 0 {
        batch.sort();
        batch.dedup();

        if let Err(e) = vector_index.touch_many(&batch).await {
            debug!(
                index = vector_index.index_name(),
                count = batch.len(),
                error = %e,
                "Failed to refresh entry recency"
            );
        }

        batch.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::MockVectorIndex;
    use std::time::Duration;

    fn hash(text: &str) -> EntryHash {
        EntryHash::compute(text, "512x512", "sdxl")
    }

    #[tokio::test]
    async fn test_burst_of_hits_is_coalesced() {
        let index = Arc::new(MockVectorIndex::new());
        let refresher = RecencyRefresher::new(index.clone());

        for _ in 0..50 {
            refresher.refresh(hash("a"));
        }
        refresher.refresh(hash("b"));

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(index.touch_batches(), 1);
        let mut touched = index.touched();
        touched.sort();
        let mut expected = vec![hash("a"), hash("b")];
        expected.sort();
        assert_eq!(touched, expected);
    }

    #[tokio::test]
    async fn test_full_queue_skips_touches() {
        let index = Arc::new(MockVectorIndex::new());
        let refresher = RecencyRefresher::new(index.clone());

        for i in 0..QUEUE_CAPACITY + 100 {
            refresher.refresh(hash(&format!("entry-{}", i)));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(index.touched().len(), QUEUE_CAPACITY);
        assert_eq!(index.touch_batches() as usize, QUEUE_CAPACITY / MAX_BATCH);
    }

    #[tokio::test]
    async fn test_clones_share_one_worker() {
        let index = Arc::new(MockVectorIndex::new());
        let refresher = RecencyRefresher::new(index.clone());
        let clone = refresher.clone();

        refresher.refresh(hash("a"));
        clone.refresh(hash("a"));

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(index.touched(), vec![hash("a")]);
    }
}
