//! Payload source consumed by runners when a replica leads a view.

use canopy_types::Payload;
use std::collections::VecDeque;

/// Supplies transaction batches for proposals.
pub trait Mempool: Send {
    /// Take up to `max` transactions. May return an empty payload.
    fn get_payload(&mut self, max: usize) -> Payload;
}

/// First-in first-out transaction queue.
#[derive(Debug, Default)]
pub struct QueueMempool {
    queue: VecDeque<Vec<u8>>,
}

impl QueueMempool {
    /// Create an empty mempool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw transaction.
    pub fn submit(&mut self, transaction: Vec<u8>) {
        self.queue.push_back(transaction);
    }

    /// Number of queued transactions.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Mempool for QueueMempool {
    fn get_payload(&mut self, max: usize) -> Payload {
        let take = max.min(self.queue.len());
        Payload::new(self.queue.drain(..take).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_fifo_and_bounded() {
        let mut mempool = QueueMempool::new();
        for i in 0..5u8 {
            mempool.submit(vec![i]);
        }

        let payload = mempool.get_payload(3);
        assert_eq!(payload.transactions, vec![vec![0], vec![1], vec![2]]);
        assert_eq!(mempool.len(), 2);
        assert_eq!(mempool.get_payload(10).len(), 2);
        assert!(mempool.get_payload(10).is_empty());
    }
}
