//! Consensus rules and chain management for the Okapi node.
//!
//! Block validation (structural and contextual), the coinbase reward
//! schedule, difficulty retargeting, the header miner, and the
//! [`ChainManager`] that decides which chain is canonical.

pub mod chain;
pub mod check;
pub mod difficulty;
pub mod error;
pub mod miner;
pub mod shadow;
pub mod subsidy;

pub use chain::{ChainManager, NetworkOps, NullNetwork};
pub use error::{BlockError, TransactionError};
