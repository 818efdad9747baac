//! Consensus error types.

use thiserror::Error;

use okapi_chain::block;
use okapi_chain::transaction::{self, OutPoint};
use okapi_state::StorageError;

/// A block that failed validation or could not be processed.
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("block has no transactions")]
    NoTransactions,
    #[error("the first transaction must be the only coinbase")]
    CoinbasePosition,
    #[error("merkle root mismatch: header {header:?} does not commit to the transactions")]
    MerkleMismatch { header: block::merkle::Root },
    #[error("header hash does not meet its proof-of-work target")]
    PoWMismatch,
    #[error("block difficulty violates the retarget schedule")]
    DifficultyViolation,
    #[error("coinbase mints more than the reward plus collected fees")]
    RewardTooLarge,
    #[error("previous block {0} is not known")]
    PrevBlockMissing(block::Hash),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A transaction inside a block that failed contextual validation.
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("input references unknown transaction {0}")]
    UnknownInput(transaction::Hash),
    #[error("double spend of {0:?}")]
    DoubleSpend(OutPoint),
    #[error("signature verification failed for input {index} of {tx}")]
    BadSignature {
        tx: transaction::Hash,
        index: usize,
    },
}
