//! Transactions and transaction-related structures.

mod hash;
mod input;
mod output;
mod sighash;

#[cfg(test)]
pub(crate) mod tests;

use okapi_serde_derive::OkSerialize;
use serde::{Deserialize, Serialize};

use crate::cached::Cached;
use crate::{OkapiDeserialize, OkapiSerialize, SerializationError};

pub use hash::Hash;
pub use input::{Input, OutPoint, COINBASE_PREV_INDEX};
pub use output::Output;
pub use sighash::{SignError, SIGHASH_ALL};

/// The maximum serialized size of a transaction, in bytes (a whole block).
pub const MAX_TX_SIZE: u64 = 1_000_000;

/// An Okapi transaction.
///
/// A transaction moves value from previous transaction outputs to new
/// outputs. The `timestamp` field is part of the canonical serialization —
/// and therefore of the signed data — and is checked against the local clock
/// at mempool admission.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, OkSerialize)]
pub struct Transaction {
    /// The transaction version.
    pub version: u32,
    /// The transaction inputs. A transaction is a coinbase iff its single
    /// input is the coinbase sentinel.
    pub inputs: Vec<Input>,
    /// The transaction outputs.
    pub outputs: Vec<Output>,
    /// The transaction lock time.
    pub lock_time: u32,
    /// Wallet-reported creation time, seconds since the Unix epoch.
    pub timestamp: u32,
    hash: Cached<Hash>,
}

impl Transaction {
    pub fn new(
        version: u32,
        inputs: Vec<Input>,
        outputs: Vec<Output>,
        lock_time: u32,
        timestamp: u32,
    ) -> Transaction {
        Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            timestamp,
            hash: Cached::new(),
        }
    }

    /// Get the hash of this transaction: the sha256d of its canonical
    /// serialization.
    pub fn hash(&self) -> Hash {
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        Hash::from(self)
    }

    /// Returns `true` if this transaction is a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && matches!(self.inputs.first(), Some(Input::Coinbase { .. }))
    }

    pub fn contains_coinbase_input(&self) -> bool {
        self.inputs
            .iter()
            .any(|input| matches!(input, Input::Coinbase { .. }))
    }

    /// The serialized length in bytes.
    pub fn serialized_size(&self) -> usize {
        let mut size = 4 + crate::CompactInt::size(self.inputs.len());
        for input in self.inputs.iter() {
            size += input.serialized_size();
        }
        size += crate::CompactInt::size(self.outputs.len());
        for output in self.outputs.iter() {
            size += output.serialized_size();
        }
        // lock_time and timestamp
        size + 4 + 4
    }

    /// The sum of the output values, in satoshis.
    pub fn output_total(&self) -> i64 {
        self.outputs.iter().map(|output| output.value).sum()
    }
}

/// Deserializes a transaction, calculating and caching its id.
impl OkapiDeserialize for Transaction {
    fn okapi_deserialize<R: std::io::Read>(src: R) -> Result<Self, SerializationError> {
        use std::io::Read;
        // Cap reads at a whole block to bound attacker-controlled sizes.
        let mut src = src.take(MAX_TX_SIZE);
        let version = u32::okapi_deserialize(&mut src)?;
        let inputs = <Vec<Input>>::okapi_deserialize(&mut src)?;
        let outputs = <Vec<Output>>::okapi_deserialize(&mut src)?;
        let lock_time = u32::okapi_deserialize(&mut src)?;
        let timestamp = u32::okapi_deserialize(&mut src)?;
        let mut tx = Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            timestamp,
            hash: Cached::new(),
        };
        let own_hash = tx.hash();
        tx.hash = Cached::from(own_hash);
        Ok(tx)
    }
}
