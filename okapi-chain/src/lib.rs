//! Core Okapi data structures and consensus-critical serialization.
//!
//! This crate defines the transaction and block data model of the Okapi
//! chain: canonical byte formats, hashing, scripts, keys and addresses, and
//! compact difficulty targets. Everything that feeds a sha256d hash lives
//! here; policy (mempool admission, fork choice) lives in the state and
//! consensus crates.

mod cached;
mod compactint;

pub mod address;
pub mod block;
pub mod keys;
pub mod parameters;
pub mod script;
pub mod serialization;
pub mod transaction;
pub mod work;

pub use cached::Cached;
pub use compactint::CompactInt;
pub use serialization::{
    OkapiDeserialize, OkapiDeserializeInto, OkapiSerialize, SerializationError,
};
