//! Fire-and-forget gossip of blocks and transactions to known peers.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use okapi_chain::block::Block;
use okapi_chain::transaction::Transaction;

use crate::constants::CONNECT_TIMEOUT_SECS;
use crate::error::PeerError;
use crate::protocol::{Codec, Message};

/// Sends envelopes to every known node except this one.
pub struct Broadcaster {
    local_address: String,
}

impl Broadcaster {
    pub fn new(local_address: String) -> Broadcaster {
        Broadcaster { local_address }
    }

    pub async fn broadcast_block(&self, block: Arc<Block>, nodes: Vec<String>) {
        self.broadcast(Message::Block(block), nodes).await
    }

    pub async fn broadcast_transaction(&self, tx: Arc<Transaction>, nodes: Vec<String>) {
        self.broadcast(Message::Tx(tx), nodes).await
    }

    async fn broadcast(&self, message: Message, nodes: Vec<String>) {
        let sends = nodes
            .into_iter()
            .filter(|node| *node != self.local_address)
            .map(|node| {
                let message = message.clone();
                async move {
                    match send_to(&node, message).await {
                        Ok(()) => debug!(peer = %node, "broadcast delivered"),
                        Err(error) => warn!(peer = %node, %error, "broadcast failed"),
                    }
                }
            });
        join_all(sends).await;
    }
}

/// Open a connection, deliver one envelope, close.
pub(crate) async fn send_to(address: &str, message: Message) -> Result<(), PeerError> {
    let connect = TcpStream::connect(address);
    let stream = tokio::time::timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS), connect)
        .await
        .map_err(|_| PeerError::ConnectionClosed)??;
    let mut framed = Framed::new(stream, Codec::builder().finish());
    framed.send(message).await?;
    framed.flush().await?;
    Ok(())
}
