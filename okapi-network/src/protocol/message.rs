//! Definitions of network messages.

use std::fmt;
use std::sync::Arc;

use okapi_chain::block::{self, Block, Height};
use okapi_chain::transaction::Transaction;

use super::Command;

/// An Okapi network message.
///
/// The wire format identifies messages by a 12-byte ASCII command string; we
/// consider that a serialization detail and use the enum discriminant
/// instead, translating only inside the codec. This also gives a single
/// validation boundary for everything that arrives off the network.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    /// A liveness probe carrying a fixed four-byte payload; a live peer
    /// replies with an identical message.
    Handshake,

    /// The peer's known `host:port` addresses.
    NodeList(Vec<String>),

    /// Request up to [`SEND_LIMIT`](crate::constants::SEND_LIMIT)
    /// consecutive blocks starting at `start_height`.
    RequestBlocks {
        /// The first height wanted.
        start_height: Height,
        /// Optionally, the last block wanted. `None` is encoded as
        /// thirty-two zero bytes.
        stop_hash: Option<block::Hash>,
    },

    /// Gossip a block ("newBlockAvbl"), or stream one in response to a
    /// request.
    Block(Arc<Block>),

    /// Gossip a transaction ("newTxMemPool"), or stream one from the
    /// mempool.
    Tx(Arc<Transaction>),

    /// Request every mempool transaction, streamed as `Tx` messages and
    /// terminated by `Finished`.
    RequestMempool,

    /// Request the secondary-chain blocks, streamed as `Block` messages and
    /// terminated by `Finished`.
    RequestSecondaryChain,

    /// Request the peer's node list; answered with `NodeList`.
    RequestNodes,

    /// End-of-stream marker. The optional parameter reports the sender's
    /// block count, so a syncing node learns how far behind it is.
    Finished(Option<u32>),
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::Handshake => Command::Handshake,
            Message::NodeList(_) => Command::NodeList,
            Message::RequestBlocks { .. } => Command::RequestBlock,
            Message::Block(_) => Command::Block,
            Message::Tx(_) => Command::Tx,
            Message::RequestMempool => Command::RequestMempool,
            Message::RequestSecondaryChain => Command::RequestSecondaryChain,
            Message::RequestNodes => Command::RequestNodes,
            Message::Finished(_) => Command::Finished,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.command())
    }
}
