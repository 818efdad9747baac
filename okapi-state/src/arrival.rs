//! The arrival buffer for gossiped blocks.
//!
//! Peer handlers enqueue structurally-valid blocks here; the miner polls the
//! level-triggered signal between hash attempts and, on losing the
//! competition, drains the buffer through chain reconciliation. The signal
//! is set exactly while the buffer is non-empty.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use okapi_chain::block::{self, Block};

/// Blocks received from peers, pending reconciliation, keyed by block hash.
#[derive(Debug, Default)]
pub struct ArrivalBuffer {
    inner: Mutex<HashMap<block::Hash, Arc<Block>>>,
    signal: AtomicBool,
}

impl ArrivalBuffer {
    pub fn new() -> ArrivalBuffer {
        ArrivalBuffer::default()
    }

    /// Enqueue a block and assert the new-block signal.
    ///
    /// Callers are expected to have checked the block's structure (Merkle
    /// root and proof of work) first.
    pub fn push(&self, block: Arc<Block>) {
        let mut inner = self.lock();
        inner.insert(block.hash(), block);
        self.signal.store(true, Ordering::SeqCst);
    }

    /// Whether a competing block is waiting. The miner checks this between
    /// hash attempts.
    pub fn is_signaled(&self) -> bool {
        self.signal.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<(block::Hash, Arc<Block>)> {
        self.lock()
            .iter()
            .map(|(hash, block)| (*hash, block.clone()))
            .collect()
    }

    pub fn remove(&self, hash: &block::Hash) {
        let mut inner = self.lock();
        inner.remove(hash);
        self.signal.store(!inner.is_empty(), Ordering::SeqCst);
    }

    pub fn remove_all<'a>(&self, hashes: impl IntoIterator<Item = &'a block::Hash>) {
        let mut inner = self.lock();
        for hash in hashes {
            inner.remove(hash);
        }
        self.signal.store(!inner.is_empty(), Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Park the calling thread until a block arrives. Used by non-mining
    /// nodes in place of the mining loop.
    pub fn wait(&self) {
        while !self.is_signaled() {
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<block::Hash, Arc<Block>>> {
        self.inner.lock().expect("arrival buffer mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use std::iter::FromIterator;

    use okapi_chain::block::{merkle, Header, Height};
    use okapi_chain::work::CompactBits;

    use super::*;

    fn block_at(height: u32) -> Arc<Block> {
        Arc::new(Block {
            height: Height(height),
            size: 80,
            header: Header::new(
                1,
                block::Hash([height as u8; 32]),
                merkle::Root::from_iter(Vec::new()),
                1_700_000_000,
                CompactBits::initial(),
                0,
            ),
            transactions: Vec::new(),
        })
    }

    #[test]
    fn signal_is_level_triggered() {
        let buffer = ArrivalBuffer::new();
        assert!(!buffer.is_signaled());

        let first = block_at(1);
        let second = block_at(2);
        buffer.push(first.clone());
        buffer.push(second.clone());
        assert!(buffer.is_signaled());

        buffer.remove(&first.hash());
        assert!(buffer.is_signaled());
        buffer.remove(&second.hash());
        assert!(!buffer.is_signaled());
    }

    #[test]
    fn remove_all_clears_signal() {
        let buffer = ArrivalBuffer::new();
        let blocks: Vec<_> = (0..3).map(block_at).collect();
        for block in &blocks {
            buffer.push(block.clone());
        }
        let hashes: Vec<_> = blocks.iter().map(|block| block.hash()).collect();
        buffer.remove_all(hashes.iter());
        assert!(buffer.is_empty());
        assert!(!buffer.is_signaled());
    }

    #[test]
    fn push_replaces_same_hash() {
        let buffer = ArrivalBuffer::new();
        let block = block_at(1);
        buffer.push(block.clone());
        buffer.push(block.clone());
        assert_eq!(buffer.len(), 1);
    }
}
