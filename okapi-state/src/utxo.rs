//! The unspent transaction output set.
//!
//! The set maps a transaction id to that transaction's outputs, where a
//! spent output slot becomes `None` but keeps its position so outpoint
//! indexes stay stable. A secondary index maps an owner hash160 to the ids
//! of transactions that still pay it.
//!
//! Invariants: every stored entry has at least one live slot, and an id
//! appears under an owner in the index iff some live slot of that
//! transaction pays the owner.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use okapi_chain::block::Block;
use okapi_chain::transaction::{self, Input, OutPoint, Output, Transaction};

/// The outputs of one transaction still present in the UTXO set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UtxoEntry {
    /// Output slots in transaction order; `None` marks a spent slot.
    pub outputs: Vec<Option<Output>>,
}

impl UtxoEntry {
    fn from_transaction(tx: &Transaction) -> UtxoEntry {
        UtxoEntry {
            outputs: tx.outputs.iter().cloned().map(Some).collect(),
        }
    }

    /// The output at `index`, if the slot exists and is unspent.
    pub fn output(&self, index: u32) -> Option<&Output> {
        self.outputs.get(index as usize).and_then(|slot| slot.as_ref())
    }

    /// How many slots are still unspent.
    pub fn live_count(&self) -> usize {
        self.outputs.iter().filter(|slot| slot.is_some()).count()
    }

    fn pays(&self, owner: &[u8; 20]) -> bool {
        self.outputs
            .iter()
            .flatten()
            .any(|output| output.owner().as_ref() == Some(owner))
    }
}

/// An unsynchronized UTXO view: the plain data structure plus its index.
///
/// [`UtxoSet`] wraps a view in a mutex for sharing; consensus checks clone a
/// view to build shadow sets for fork validation.
#[derive(Clone, Debug, Default)]
pub struct UtxoView {
    entries: HashMap<transaction::Hash, UtxoEntry>,
    by_owner: HashMap<[u8; 20], HashSet<transaction::Hash>>,
}

impl UtxoView {
    pub fn new() -> UtxoView {
        UtxoView::default()
    }

    pub fn contains(&self, id: &transaction::Hash) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &transaction::Hash) -> Option<&UtxoEntry> {
        self.entries.get(id)
    }

    /// The referenced output, if its transaction is present and the slot is
    /// live.
    pub fn output_of(&self, outpoint: &OutPoint) -> Option<&Output> {
        self.entries
            .get(&outpoint.hash)
            .and_then(|entry| entry.output(outpoint.index))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store `tx` with every output live, replacing any previous entry.
    pub fn insert(&mut self, tx: &Transaction) {
        let id = tx.hash();
        self.remove_entry(&id);
        let entry = UtxoEntry::from_transaction(tx);
        for output in entry.outputs.iter().flatten() {
            if let Some(owner) = output.owner() {
                self.by_owner.entry(owner).or_default().insert(id);
            }
        }
        self.entries.insert(id, entry);
    }

    /// Null the referenced slot, or drop the whole entry when it was the
    /// last live slot. Unknown ids and already-spent slots are ignored.
    pub fn spend(&mut self, outpoint: &OutPoint) {
        let entry = match self.entries.get_mut(&outpoint.hash) {
            Some(entry) => entry,
            None => return,
        };
        if entry.output(outpoint.index).is_none() {
            return;
        }
        if entry.live_count() > 1 {
            let spent = entry.outputs[outpoint.index as usize]
                .take()
                .expect("slot checked live above");
            if let Some(owner) = spent.owner() {
                let entry = &self.entries[&outpoint.hash];
                if !entry.pays(&owner) {
                    self.index_remove(&owner, &outpoint.hash);
                }
            }
        } else {
            self.remove_entry(&outpoint.hash);
        }
    }

    /// Undo a spend during a reorg: re-add the slot from the confirmed
    /// previous transaction, or the whole transaction when the entry is
    /// gone.
    pub fn restore(&mut self, outpoint: &OutPoint, confirmed: &Transaction) {
        if self.entries.contains_key(&outpoint.hash) {
            let output = match confirmed.outputs.get(outpoint.index as usize) {
                Some(output) => output.clone(),
                None => return,
            };
            if let Some(owner) = output.owner() {
                self.by_owner.entry(owner).or_default().insert(outpoint.hash);
            }
            if let Some(entry) = self.entries.get_mut(&outpoint.hash) {
                if let Some(slot) = entry.outputs.get_mut(outpoint.index as usize) {
                    *slot = Some(output);
                }
            }
        } else {
            self.insert(confirmed);
        }
    }

    /// Drop a transaction and all of its index references.
    pub fn remove_entry(&mut self, id: &transaction::Hash) {
        if let Some(entry) = self.entries.remove(id) {
            for output in entry.outputs.iter().flatten() {
                if let Some(owner) = output.owner() {
                    self.index_remove(&owner, id);
                }
            }
        }
    }

    /// Ids of transactions with a live output paying `owner`.
    pub fn owned_by(&self, owner: &[u8; 20]) -> Vec<transaction::Hash> {
        self.by_owner
            .get(owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Rebuild from scratch out of the canonical chain: insert every
    /// transaction, then null every slot a later input consumed.
    pub fn rebuild(&mut self, blocks: &[Arc<Block>]) {
        self.entries.clear();
        self.by_owner.clear();
        for block in blocks {
            for tx in &block.transactions {
                self.insert(tx);
            }
        }
        for block in blocks {
            for tx in &block.transactions {
                for input in &tx.inputs {
                    if let Input::PrevOut { outpoint, .. } = input {
                        self.spend(outpoint);
                    }
                }
            }
        }
    }

    /// Apply a confirmed transaction: store its outputs and consume the
    /// outputs its inputs reference.
    pub fn apply(&mut self, tx: &Transaction) {
        self.insert(tx);
        for input in &tx.inputs {
            if let Input::PrevOut { outpoint, .. } = input {
                self.spend(outpoint);
            }
        }
    }

    fn index_remove(&mut self, owner: &[u8; 20], id: &transaction::Hash) {
        if let Some(ids) = self.by_owner.get_mut(owner) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_owner.remove(owner);
            }
        }
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        for (id, entry) in &self.entries {
            assert!(entry.live_count() > 0, "entry {} has no live slots", id);
        }
        for (owner, ids) in &self.by_owner {
            for id in ids {
                let entry = self.entries.get(id).expect("indexed id exists");
                assert!(entry.pays(owner), "indexed id {} no longer pays owner", id);
            }
        }
        for (id, entry) in &self.entries {
            for output in entry.outputs.iter().flatten() {
                if let Some(owner) = output.owner() {
                    assert!(
                        self.by_owner.get(&owner).map_or(false, |ids| ids.contains(id)),
                        "live output of {} missing from index",
                        id
                    );
                }
            }
        }
    }
}

/// The shared UTXO set: a [`UtxoView`] behind a mutex.
#[derive(Debug, Default)]
pub struct UtxoSet {
    inner: Mutex<UtxoView>,
}

impl UtxoSet {
    pub fn new() -> UtxoSet {
        UtxoSet::default()
    }

    pub fn contains(&self, id: &transaction::Hash) -> bool {
        self.lock().contains(id)
    }

    pub fn output_of(&self, outpoint: &OutPoint) -> Option<Output> {
        self.lock().output_of(outpoint).cloned()
    }

    pub fn entry(&self, id: &transaction::Hash) -> Option<UtxoEntry> {
        self.lock().get(id).cloned()
    }

    pub fn insert(&self, tx: &Transaction) {
        self.lock().insert(tx)
    }

    pub fn spend(&self, outpoint: &OutPoint) {
        self.lock().spend(outpoint)
    }

    pub fn restore(&self, outpoint: &OutPoint, confirmed: &Transaction) {
        self.lock().restore(outpoint, confirmed)
    }

    pub fn remove_entry(&self, id: &transaction::Hash) {
        self.lock().remove_entry(id)
    }

    pub fn apply(&self, tx: &Transaction) {
        self.lock().apply(tx)
    }

    pub fn owned_by(&self, owner: &[u8; 20]) -> Vec<transaction::Hash> {
        self.lock().owned_by(owner)
    }

    pub fn rebuild(&self, blocks: &[Arc<Block>]) {
        self.lock().rebuild(blocks)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Clone the whole view, for shadow validation of candidate chains.
    pub fn snapshot(&self) -> UtxoView {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UtxoView> {
        self.inner.lock().expect("utxo set mutex poisoned")
    }
}
