//! The secondary chain: recently-seen blocks off the canonical chain.
//!
//! Fork resolution walks this bounded buffer to reconstruct candidate
//! chains. It holds at most the last [`MEMORY_SIZE`] heights behind the
//! current tip, which bounds how deep a reorg this node will ever consider.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use okapi_chain::block::{self, Block, Height};

/// How many heights behind the tip a shelved block is retained.
pub const MEMORY_SIZE: u32 = 50;

/// A bounded map of off-chain blocks, keyed by block hash.
#[derive(Debug, Default)]
pub struct SecondaryChain {
    inner: Mutex<HashMap<block::Hash, Arc<Block>>>,
}

impl SecondaryChain {
    pub fn new() -> SecondaryChain {
        SecondaryChain::default()
    }

    pub fn insert(&self, block: Arc<Block>) {
        self.lock().insert(block.hash(), block);
    }

    pub fn get(&self, hash: &block::Hash) -> Option<Arc<Block>> {
        self.lock().get(hash).cloned()
    }

    pub fn contains(&self, hash: &block::Hash) -> bool {
        self.lock().contains_key(hash)
    }

    pub fn remove(&self, hash: &block::Hash) {
        self.lock().remove(hash);
    }

    pub fn remove_all<'a>(&self, hashes: impl IntoIterator<Item = &'a block::Hash>) {
        let mut inner = self.lock();
        for hash in hashes {
            inner.remove(hash);
        }
    }

    /// Drop blocks more than [`MEMORY_SIZE`] heights behind `tip`.
    pub fn prune(&self, tip: Height) {
        self.lock()
            .retain(|_, block| block.height.0 + MEMORY_SIZE >= tip.0);
    }

    pub fn snapshot(&self) -> Vec<Arc<Block>> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<block::Hash, Arc<Block>>> {
        self.inner.lock().expect("secondary chain mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use std::iter::FromIterator;

    use okapi_chain::block::{Header, merkle};
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
                1_700_000_000 + height,
                CompactBits::initial(),
                height,
            ),
            transactions: Vec::new(),
        })
    }

    #[test]
    fn insert_and_lookup_by_hash() {
        let chain = SecondaryChain::new();
        let block = block_at(5);
        chain.insert(block.clone());
        assert!(chain.contains(&block.hash()));
        assert_eq!(chain.get(&block.hash()).unwrap().height, Height(5));
    }

    #[test]
    fn prune_drops_only_stale_heights() {
        let chain = SecondaryChain::new();
        let old = block_at(10);
        let recent = block_at(60);
        let boundary = block_at(11);
        chain.insert(old.clone());
        chain.insert(recent.clone());
        chain.insert(boundary.clone());

        chain.prune(Height(61));
        assert!(!chain.contains(&old.hash()));
        assert!(chain.contains(&boundary.hash()));
        assert!(chain.contains(&recent.hash()));
    }

    #[test]
    fn remove_all_clears_candidates() {
        let chain = SecondaryChain::new();
        let blocks: Vec<_> = (0..4).map(block_at).collect();
        for block in &blocks {
            chain.insert(block.clone());
        }
        let hashes: Vec<_> = blocks.iter().map(|block| block.hash()).collect();
        chain.remove_all(hashes.iter());
        assert!(chain.is_empty());
    }
}
