//! The chain manager: mining rounds, competitor reconciliation, and fork
//! resolution.

use std::collections::HashSet;
use std::sync::Arc;

use primitive_types::U256;
use tracing::{info, warn};

use okapi_chain::address::Address;
use okapi_chain::block::{self, Block, Header, Height};
use okapi_chain::parameters::{GENESIS_PREVIOUS_BLOCK_HASH, VERSION};
use okapi_chain::transaction::{self, Input, Transaction};
use okapi_chain::work::CompactBits;
use okapi_state::{ArrivalBuffer, FinalizedState, Mempool, SecondaryChain, UtxoSet};

use crate::difficulty::{self, RETARGET_INTERVAL};
use crate::error::BlockError;
use crate::{check, miner, subsidy};

/// The network operations the chain manager drives but does not implement:
/// announcing blocks and catching the canonical chain up from peers.
pub trait NetworkOps: Send + Sync {
    /// Announce a freshly-persisted block to peers, asynchronously.
    fn broadcast_block(&self, block: Arc<Block>);

    /// Pull blocks from peers until the canonical store is caught up.
    /// Returns when the sync pass completes.
    fn resync(&self);
}

/// A network that does nothing, for isolated nodes and tests.
pub struct NullNetwork;

impl NetworkOps for NullNetwork {
    fn broadcast_block(&self, _: Arc<Block>) {}
    fn resync(&self) {}
}

/// Decides which chain is canonical.
///
/// One instance is owned by the mining thread; the shared containers it
/// mutates are internally synchronized.
pub struct ChainManager {
    utxos: Arc<UtxoSet>,
    mempool: Arc<Mempool>,
    arrivals: Arc<ArrivalBuffer>,
    secondary: Arc<SecondaryChain>,
    store: Arc<FinalizedState>,
    network: Arc<dyn NetworkOps>,
    current_target: U256,
    bits: CompactBits,
    mine: bool,
}

impl ChainManager {
    pub fn new(
        utxos: Arc<UtxoSet>,
        mempool: Arc<Mempool>,
        arrivals: Arc<ArrivalBuffer>,
        secondary: Arc<SecondaryChain>,
        store: Arc<FinalizedState>,
        network: Arc<dyn NetworkOps>,
        mine: bool,
    ) -> ChainManager {
        ChainManager {
            utxos,
            mempool,
            arrivals,
            secondary,
            store,
            network,
            current_target: CompactBits::initial().expand(),
            bits: CompactBits::initial(),
            mine,
        }
    }

    /// Prepare for the run loop: mine the genesis block if the store is
    /// empty, rebuild the UTXO set from the canonical chain, and restore the
    /// difficulty from the tip.
    pub fn bootstrap(&mut self, miner_address: &Address) -> Result<(), BlockError> {
        if self.store.last_block()?.is_none() {
            info!("chain is empty, working on the genesis block");
            self.add_block(Height(0), GENESIS_PREVIOUS_BLOCK_HASH, miner_address)?;
        }
        self.utxos.rebuild(&self.store.all_blocks()?);
        if let Some(tip) = self.store.last_block()? {
            self.bits = tip.header.bits;
            self.current_target = self.bits.expand();
        }
        Ok(())
    }

    /// The node main loop: work on the next block forever.
    pub fn run(&mut self, miner_address: &Address) -> Result<(), BlockError> {
        loop {
            let tip = self
                .store
                .last_block()?
                .ok_or(BlockError::PrevBlockMissing(GENESIS_PREVIOUS_BLOCK_HASH))?;
            let height = tip.height.next();
            info!(height = height.0, "current block height");
            let started = std::time::Instant::now();
            self.add_block(height, tip.hash(), miner_address)?;
            info!(elapsed_ms = started.elapsed().as_millis() as u64, "round finished");
        }
    }

    /// One round of work at `height` on top of `previous_hash`.
    ///
    /// Assembles a block from the mempool, mines it against the new-block
    /// signal, and either commits and broadcasts it or reconciles the
    /// competitor blocks that preempted it.
    pub fn add_block(
        &mut self,
        height: Height,
        previous_hash: block::Hash,
        miner_address: &Address,
    ) -> Result<(), BlockError> {
        self.secondary.prune(height);
        let template = self.mempool.select_for_block();

        let now = chrono::Utc::now().timestamp() as u32;
        let coinbase = subsidy::coinbase_transaction(height, miner_address, template.fee, now);
        let size = template.size + coinbase.serialized_size();

        let mut tx_hashes = Vec::with_capacity(template.tx_hashes.len() + 1);
        tx_hashes.push(coinbase.hash());
        tx_hashes.extend(template.tx_hashes.iter().copied());

        let mut transactions: Vec<Arc<Transaction>> =
            Vec::with_capacity(template.transactions.len() + 1);
        transactions.push(Arc::new(coinbase));
        transactions.extend(template.transactions);

        let merkle_root = tx_hashes.iter().copied().collect();
        self.maybe_retarget(height)?;
        let mut header = Header::new(VERSION, previous_hash, merkle_root, now, self.bits, 0);

        let lost = if self.mine {
            miner::mine(&mut header, self.current_target, &self.arrivals)
        } else {
            self.arrivals.wait();
            true
        };

        if lost {
            return self.lost_competition();
        }

        let block = Arc::new(Block {
            height,
            size: size as u32,
            header,
            transactions,
        });
        // UTXO updates land before the block becomes visible in the store,
        // so observers never see a confirmed block with unspendable outputs.
        for tx in &block.transactions {
            self.utxos.apply(tx);
        }
        self.mempool.remove_all(tx_hashes.iter());
        self.store.save_block(&block)?;
        info!(
            height = height.0,
            nonce = block.header.nonce,
            hash = %block.hash(),
            "block mined"
        );
        metrics::counter!("chain.mined.block.count").increment(1);
        self.network.broadcast_block(block);
        Ok(())
    }

    /// Recompute the target at a retarget boundary from the previous
    /// interval's endpoints.
    fn maybe_retarget(&mut self, height: Height) -> Result<(), BlockError> {
        if height.0 == 0 || height.0 % RETARGET_INTERVAL != 0 {
            return Ok(());
        }
        let newest = self.store.block(Height(height.0 - 1))?;
        let oldest = self.store.block(Height(height.0 - RETARGET_INTERVAL))?;
        if let (Some(newest), Some(oldest)) = (newest, oldest) {
            if let Some(new_target) = difficulty::next_target(&newest, &oldest) {
                self.bits = CompactBits::compress(new_target);
                self.current_target = self.bits.expand();
                info!(height = height.0, bits = ?self.bits, "difficulty retargeted");
            }
        }
        Ok(())
    }

    /// Reconcile the arrival buffer after another miner won the round.
    ///
    /// Each buffered block is contextually validated (invalid ones are
    /// dropped and logged), then either applied as a chain extension or
    /// handed to fork resolution.
    pub fn lost_competition(&mut self) -> Result<(), BlockError> {
        let buffered = self.arrivals.snapshot();
        let mut processed: Vec<block::Hash> = Vec::new();
        for (hash, block) in buffered {
            if let Err(error) =
                check::contextual(&block, &self.utxos, &self.store, &self.secondary)
            {
                warn!(%hash, %error, "dropping invalid competitor block");
                self.arrivals.remove(&hash);
                continue;
            }
            processed.push(hash);

            let tip = self.store.last_block()?;
            let extends = check::extends(&block, tip.as_deref())
                && check::difficulty_is_valid(block.header.bits, self.current_target).is_ok();
            if extends {
                info!(height = block.height.0, %hash, "competitor extends the chain");
                self.apply_block(&block)?;
            } else {
                self.resolve_conflict(block, true)?;
            }
        }
        self.arrivals.remove_all(processed.iter());
        Ok(())
    }

    /// Apply a block that extends the canonical tip: update UTXOs, drop its
    /// transactions from the mempool, persist.
    fn apply_block(&self, block: &Block) -> Result<(), BlockError> {
        for tx in &block.transactions {
            self.utxos.apply(tx);
            self.mempool.remove(&tx.hash());
        }
        self.store.save_block(block)?;
        Ok(())
    }

    /// Decide whether `block` begins a heavier chain and, if so, switch to
    /// it.
    ///
    /// "Heavier" is approximated by height. A lone block at or below the tip
    /// height is shelved in the secondary chain (the incumbent wins the
    /// tie); a candidate chain reconstructed from the secondary buffer
    /// replaces the canonical overlap once its difficulty schedule and
    /// attachment check out.
    fn resolve_conflict(&mut self, block: Arc<Block>, may_resync: bool) -> Result<(), BlockError> {
        let tip = match self.store.last_block()? {
            Some(tip) => tip,
            None => {
                self.secondary.insert(block);
                return Ok(());
            }
        };
        if block.height < tip.height {
            self.secondary.insert(block);
            return Ok(());
        }

        // Reconstruct the candidate chain from the secondary buffer, newest
        // first.
        let mut candidate: Vec<Arc<Block>> = vec![block.clone()];
        let mut root_prev = block.header.previous_block_hash;
        while let Some(ancestor) = self.secondary.get(&root_prev) {
            root_prev = ancestor.header.previous_block_hash;
            candidate.push(ancestor);
        }

        // A lone competitor tying the tip height loses to the incumbent.
        if candidate.len() == 1 && block.height == tip.height {
            self.secondary.insert(block);
            return Ok(());
        }

        if let Err(error) = self.schedule_is_valid(&candidate) {
            warn!(hash = %block.hash(), %error, "candidate chain violates the difficulty schedule");
            self.arrivals.remove(&block.hash());
            return Ok(());
        }

        let root_height = candidate.last().expect("candidate is non-empty").height;

        // If the candidate forks past everything we have, the local chain is
        // behind: catch up and retry once.
        if root_height.0 > self.store.block_count() {
            if may_resync {
                info!("canonical chain is behind the candidate, resyncing");
                self.network.resync();
                return self.resolve_conflict(block, false);
            }
            self.secondary.insert(block);
            return Ok(());
        }

        let attached = if root_height.0 == 0 {
            root_prev.is_zero()
        } else {
            match self.store.block(Height(root_height.0 - 1))? {
                Some(parent) => parent.hash() == root_prev,
                None => false,
            }
        };
        if !attached {
            self.secondary.insert(block);
            return Ok(());
        }

        info!(
            from = root_height.0,
            to = block.height.0,
            "conflict resolved, switching to the candidate chain"
        );

        // Displace the overlapping canonical blocks: restore the outputs
        // they consumed and bag their transactions for re-admission.
        let mut orphans: Vec<Arc<Transaction>> = Vec::new();
        for height in root_height.0..=tip.height.0 {
            let displaced = match self.store.block(Height(height))? {
                Some(displaced) => displaced,
                None => continue,
            };
            for tx in &displaced.transactions {
                self.utxos.remove_entry(&tx.hash());
                if tx.is_coinbase() {
                    continue;
                }
                for input in &tx.inputs {
                    if let Input::PrevOut { outpoint, .. } = input {
                        if let Some((prev_tx, _)) = self.store.find_transaction(&outpoint.hash)? {
                            self.utxos.restore(outpoint, &prev_tx);
                        }
                    }
                }
                orphans.push(tx.clone());
            }
            self.secondary.insert(displaced);
        }

        // Apply the candidate chain, oldest first.
        let mut included: HashSet<transaction::Hash> = HashSet::new();
        for candidate_block in candidate.iter().rev() {
            for tx in &candidate_block.transactions {
                self.utxos.apply(tx);
                self.mempool.remove(&tx.hash());
                if !tx.is_coinbase() {
                    included.insert(tx.hash());
                }
            }
            self.store.save_block(candidate_block)?;
        }

        // Displaced transactions the candidate did not include go back
        // through normal mempool admission.
        for orphan in orphans {
            if included.contains(&orphan.hash()) {
                continue;
            }
            if let Err(error) = self.mempool.add(orphan.clone()) {
                warn!(tx = %orphan.hash(), %error, "orphaned transaction not re-admitted");
            }
        }

        // The candidate is canonical now; its tip sets the working
        // difficulty.
        self.bits = block.header.bits;
        self.current_target = self.bits.expand();

        let candidate_hashes: Vec<_> = candidate.iter().map(|b| b.hash()).collect();
        self.secondary.remove_all(candidate_hashes.iter());
        Ok(())
    }

    /// Verify the retarget schedule along a candidate chain (ordered newest
    /// first): at every 10-block boundary the expected bits are recomputed
    /// with the same retarget math, and no block may claim an easier target.
    fn schedule_is_valid(&self, candidate: &[Arc<Block>]) -> Result<(), BlockError> {
        let root = candidate.last().expect("candidate is non-empty");
        if root.height.0 == 0 {
            return Ok(());
        }
        let mut prev = match self.store.block(Height(root.height.0 - 1))? {
            Some(prev) => prev,
            None => return Ok(()),
        };
        let boundary_height = if root.height.0 % RETARGET_INTERVAL != 0 {
            (root.height.0 / RETARGET_INTERVAL) * RETARGET_INTERVAL
        } else {
            root.height.0 - RETARGET_INTERVAL
        };
        let mut boundary = match self.store.block(Height(boundary_height))? {
            Some(boundary) => boundary,
            None => return Ok(()),
        };
        let mut expected = boundary.header.bits;

        for candidate_block in candidate.iter().rev() {
            if candidate_block.height.0 % RETARGET_INTERVAL == 0 && candidate_block.height.0 != 0 {
                if let Some(target) = difficulty::next_target(&prev, &boundary) {
                    expected = CompactBits::compress(target);
                }
                boundary = candidate_block.clone();
            }
            check::difficulty_is_valid(candidate_block.header.bits, expected.expand())
                .map_err(|_| BlockError::DifficultyViolation)?;
            prev = candidate_block.clone();
        }
        Ok(())
    }
}
