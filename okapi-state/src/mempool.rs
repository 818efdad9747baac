//! The memory pool of unconfirmed transactions.
//!
//! Admission validates a transaction against the current UTXO set and the
//! pool itself; selection orders the pool by fee-per-byte and assembles the
//! transaction set of the next block. The pool is insertion-ordered so
//! snapshots stream in arrival order.

use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

use okapi_chain::transaction::{self, Input, OutPoint, Transaction};

use crate::utxo::UtxoSet;

/// The maximum size of a block, and the denominator of the fee rate.
pub const MAX_BLOCK_SIZE: usize = 1024 * 1024;

/// The base fee per byte, in satoshis.
pub const BASE_FEE: i64 = 100_000;

/// How far in the past a transaction timestamp may lie, in seconds.
const MAX_TX_AGE: u32 = 3600;

/// The bytes reserved for the block header when filling a block.
const HEADER_RESERVE: usize = 80;

/// Why a transaction was refused admission.
#[derive(Error, Debug, Eq, PartialEq)]
pub enum MempoolError {
    /// The reported creation time is in the future or over an hour old.
    #[error("transaction timestamp is stale or in the future")]
    StaleTimestamp,
    /// An input references a transaction absent from the UTXO set.
    #[error("input references unknown transaction {0}")]
    UnknownInput(transaction::Hash),
    /// An input references an output slot that is already spent.
    #[error("double spend of {0:?}")]
    DoubleSpend(OutPoint),
    /// An input's script_sig does not satisfy the referenced script_pubkey.
    #[error("signature verification failed for input {0}")]
    BadSignature(usize),
    /// The fee is below `size · fee_rate`.
    #[error("insufficient fee: outputs {outputs}, inputs {inputs}, required fee {required}")]
    InsufficientFee {
        outputs: i64,
        inputs: i64,
        required: i64,
    },
}

#[derive(Default)]
struct Pool {
    transactions: IndexMap<transaction::Hash, Arc<Transaction>>,
    /// Outpoint → the pool transaction spending it, for conflict rejection.
    spent: HashMap<OutPoint, transaction::Hash>,
}

/// The shared memory pool.
pub struct Mempool {
    inner: Mutex<Pool>,
    utxos: Arc<UtxoSet>,
}

/// The transaction set selected for the next block.
pub struct BlockTemplate {
    /// Selected transactions, highest fee rate first.
    pub transactions: Vec<Arc<Transaction>>,
    /// Every outpoint the selected transactions consume.
    pub spent: Vec<OutPoint>,
    /// Hashes of the selected transactions, in the same order.
    pub tx_hashes: Vec<transaction::Hash>,
    /// The summed fees of the selection, in satoshis.
    pub fee: i64,
    /// Running block size: the header reserve plus the selected
    /// transactions.
    pub size: usize,
}

impl Mempool {
    pub fn new(utxos: Arc<UtxoSet>) -> Mempool {
        Mempool {
            inner: Mutex::new(Pool::default()),
            utxos,
        }
    }

    /// Validate `tx` against the clock, the UTXO set, and the pool, then
    /// admit it. Fails atomically: a rejected transaction leaves no trace.
    pub fn add(&self, tx: Arc<Transaction>) -> Result<(), MempoolError> {
        self.add_at(tx, chrono::Utc::now().timestamp() as u32)
    }

    /// [`add`](Mempool::add) with an explicit clock.
    pub fn add_at(&self, tx: Arc<Transaction>, now: u32) -> Result<(), MempoolError> {
        if !(tx.timestamp <= now && tx.timestamp > now.saturating_sub(MAX_TX_AGE)) {
            return Err(MempoolError::StaleTimestamp);
        }

        // The pool lock is held across validation so two conflicting
        // admissions cannot interleave.
        let mut pool = self.lock();

        let mut input_total: i64 = 0;
        for (index, input) in tx.inputs.iter().enumerate() {
            let outpoint = match input {
                Input::PrevOut { outpoint, .. } => *outpoint,
                Input::Coinbase { .. } => {
                    return Err(MempoolError::UnknownInput(transaction::Hash::zero()))
                }
            };
            let entry = self
                .utxos
                .entry(&outpoint.hash)
                .ok_or(MempoolError::UnknownInput(outpoint.hash))?;
            let prev_output = entry
                .output(outpoint.index)
                .ok_or(MempoolError::DoubleSpend(outpoint))?
                .clone();
            if pool.spent.contains_key(&outpoint) {
                return Err(MempoolError::DoubleSpend(outpoint));
            }
            if !tx.verify_input(index, &prev_output.script_pubkey) {
                return Err(MempoolError::BadSignature(index));
            }
            input_total += prev_output.value;
        }

        let output_total = tx.output_total();
        let required = tx.serialized_size() as i64 * fee_rate_of(&pool);
        if output_total > input_total - required {
            return Err(MempoolError::InsufficientFee {
                outputs: output_total,
                inputs: input_total,
                required,
            });
        }

        let id = tx.hash();
        for input in &tx.inputs {
            if let Input::PrevOut { outpoint, .. } = input {
                pool.spent.insert(*outpoint, id);
            }
        }
        pool.transactions.insert(id, tx);
        metrics::gauge!("mempool.size").set(pool.transactions.len() as f64);
        Ok(())
    }

    /// Remove a transaction, releasing the outpoints it claimed.
    pub fn remove(&self, id: &transaction::Hash) {
        let mut pool = self.lock();
        remove_locked(&mut pool, id);
        metrics::gauge!("mempool.size").set(pool.transactions.len() as f64);
    }

    pub fn remove_all<'a>(&self, ids: impl IntoIterator<Item = &'a transaction::Hash>) {
        let mut pool = self.lock();
        for id in ids {
            remove_locked(&mut pool, id);
        }
        metrics::gauge!("mempool.size").set(pool.transactions.len() as f64);
    }

    pub fn contains(&self, id: &transaction::Hash) -> bool {
        self.lock().transactions.contains_key(id)
    }

    pub fn get(&self, id: &transaction::Hash) -> Option<Arc<Transaction>> {
        self.lock().transactions.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().transactions.is_empty()
    }

    /// All pool transactions, in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<Transaction>> {
        self.lock().transactions.values().cloned().collect()
    }

    /// The current fee requirement per byte: the base fee scaled by how far
    /// the pool has backed up past one block's worth of bytes.
    pub fn fee_rate(&self) -> i64 {
        fee_rate_of(&self.lock())
    }

    /// Pick the transaction set of the next block: sort by fee-per-byte
    /// descending and fill greedily until the size limit. Transactions whose
    /// inputs are no longer spendable, or that conflict with an
    /// already-selected transaction, are evicted from the pool.
    pub fn select_for_block(&self) -> BlockTemplate {
        let mut pool = self.lock();
        let utxos = self.utxos.snapshot();

        let mut candidates: Vec<(transaction::Hash, Arc<Transaction>, i64, usize)> = pool
            .transactions
            .iter()
            .map(|(id, tx)| {
                let size = tx.serialized_size();
                let fee = fee_of(tx, &utxos);
                (*id, tx.clone(), fee, size)
            })
            .collect();
        // Highest fee-per-byte first; compare by cross-multiplication to
        // avoid floating point.
        candidates.sort_by(|(_, _, fee_a, size_a), (_, _, fee_b, size_b)| {
            (*fee_b as i128 * *size_a as i128).cmp(&(*fee_a as i128 * *size_b as i128))
        });

        let mut template = BlockTemplate {
            transactions: Vec::new(),
            spent: Vec::new(),
            tx_hashes: Vec::new(),
            fee: 0,
            size: HEADER_RESERVE,
        };
        let mut claimed: HashSet<OutPoint> = HashSet::new();

        for (id, tx, fee, size) in candidates {
            if template.size + size > MAX_BLOCK_SIZE {
                break;
            }
            let spendable = tx.inputs.iter().all(|input| match input {
                Input::PrevOut { outpoint, .. } => {
                    utxos.output_of(outpoint).is_some() && !claimed.contains(outpoint)
                }
                Input::Coinbase { .. } => false,
            });
            if !spendable {
                debug!(tx = %id, "evicting unspendable transaction from mempool");
                remove_locked(&mut pool, &id);
                continue;
            }
            for input in &tx.inputs {
                if let Input::PrevOut { outpoint, .. } = input {
                    claimed.insert(*outpoint);
                    template.spent.push(*outpoint);
                }
            }
            template.size += size;
            template.fee += fee;
            template.tx_hashes.push(id);
            template.transactions.push(tx);
        }
        template
    }

    fn lock(&self) -> MutexGuard<'_, Pool> {
        self.inner.lock().expect("mempool mutex poisoned")
    }
}

fn remove_locked(pool: &mut Pool, id: &transaction::Hash) {
    if let Some(tx) = pool.transactions.shift_remove(id) {
        for input in &tx.inputs {
            if let Input::PrevOut { outpoint, .. } = input {
                pool.spent.remove(outpoint);
            }
        }
    }
}

fn fee_rate_of(pool: &Pool) -> i64 {
    let total_bytes: usize = pool
        .transactions
        .values()
        .map(|tx| tx.serialized_size())
        .sum();
    std::cmp::max(1, (total_bytes / MAX_BLOCK_SIZE) as i64) * BASE_FEE
}

/// The fee a transaction pays against a UTXO view: inputs minus outputs,
/// counting only inputs that are still spendable.
fn fee_of(tx: &Transaction, utxos: &crate::utxo::UtxoView) -> i64 {
    let input_total: i64 = tx
        .inputs
        .iter()
        .filter_map(|input| match input {
            Input::PrevOut { outpoint, .. } => utxos.output_of(outpoint).map(|output| output.value),
            Input::Coinbase { .. } => None,
        })
        .sum();
    input_total - tx.output_total()
}
