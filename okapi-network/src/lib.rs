//! The Okapi peer-to-peer protocol.
//!
//! Peers exchange single-shot, length-prefixed envelopes over TCP: a fixed
//! 24-byte header (magic, command, payload length, sha256d checksum)
//! followed by the payload. Each inbound connection carries one request and
//! at most one streamed response, then closes.

mod broadcast;
mod error;
mod handle;
mod server;
mod sync;

pub mod constants;
pub mod protocol;

pub use broadcast::Broadcaster;
pub use error::PeerError;
pub use handle::NetworkHandle;
pub use protocol::{Codec, Command, Message};
pub use server::PeerServer;
pub use sync::Signup;
