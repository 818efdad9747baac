//! Shared mutable state of an Okapi node.
//!
//! Four in-memory containers — the UTXO set, the mempool, the new-block
//! arrival buffer, and the secondary chain — are shared between the miner,
//! the peer listener, and the boot-time sync. Each container is internally
//! synchronized with a single mutex and mutated only through its methods, so
//! every operation is atomic and no compound read-modify-write crosses the
//! API boundary.
//!
//! The canonical chain itself is persistent, in the sled-backed
//! [`FinalizedState`].

pub mod arrival;
pub mod mempool;
pub mod secondary_chain;
pub mod storage;
pub mod utxo;

pub use arrival::ArrivalBuffer;
pub use mempool::{BlockTemplate, Mempool, MempoolError};
pub use secondary_chain::SecondaryChain;
pub use storage::{FinalizedState, StorageError};
pub use utxo::{UtxoEntry, UtxoSet, UtxoView};
