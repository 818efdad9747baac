//! The peer listener: one request per connection, an optional streamed
//! response, then close.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use okapi_consensus::check;
use okapi_state::{ArrivalBuffer, FinalizedState, Mempool, SecondaryChain};

use crate::constants::SEND_LIMIT;
use crate::error::PeerError;
use crate::protocol::{Codec, Message};

/// Handles inbound peer connections against the shared node state.
pub struct PeerServer {
    mempool: Arc<Mempool>,
    arrivals: Arc<ArrivalBuffer>,
    secondary: Arc<SecondaryChain>,
    store: Arc<FinalizedState>,
}

impl PeerServer {
    pub fn new(
        mempool: Arc<Mempool>,
        arrivals: Arc<ArrivalBuffer>,
        secondary: Arc<SecondaryChain>,
        store: Arc<FinalizedState>,
    ) -> PeerServer {
        PeerServer {
            mempool,
            arrivals,
            secondary,
            store,
        }
    }

    /// Accept connections forever, one task per connection.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        info!(local = ?listener.local_addr().ok(), "peer server listening");
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(error) = server.handle_connection(stream, addr).await {
                            debug!(peer = %addr, %error, "connection ended with error");
                        }
                    });
                }
                Err(error) => warn!(%error, "failed to accept connection"),
            }
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), PeerError> {
        let mut framed = Framed::new(
            stream,
            Codec::builder()
                .with_metrics_label(addr.to_string())
                .finish(),
        );

        // A peer connecting from its own listening port announces itself;
        // four-digit ports are how nodes on this network are deployed.
        if (1000..=9999).contains(&addr.port()) {
            let address = format!("{}:{}", addr.ip(), addr.port());
            if let Err(error) = self.store.add_node(&address) {
                warn!(%error, "failed to record peer address");
            }
        }

        let message = match framed.next().await {
            Some(message) => message?,
            None => return Err(PeerError::ConnectionClosed),
        };
        debug!(peer = %addr, %message, "handling request");

        match message {
            Message::Handshake => framed.send(Message::Handshake).await?,
            Message::Tx(tx) => {
                let id = tx.hash();
                if let Err(error) = self.mempool.add(tx) {
                    info!(tx = %id, %error, "gossiped transaction rejected");
                }
            }
            Message::Block(block) => match check::structural(&block) {
                Ok(()) => {
                    info!(height = block.height.0, hash = %block.hash(), "new block received");
                    self.arrivals.push(block);
                }
                Err(error) => info!(%error, "gossiped block rejected"),
            },
            Message::RequestBlocks { start_height, .. } => {
                let blocks = self.store.blocks(start_height, SEND_LIMIT)?;
                for block in blocks {
                    debug!(height = block.height.0, "sending block");
                    framed.send(Message::Block(block)).await?;
                }
                framed
                    .send(Message::Finished(Some(self.store.block_count())))
                    .await?;
            }
            Message::RequestMempool => {
                for tx in self.mempool.snapshot() {
                    framed.send(Message::Tx(tx)).await?;
                }
                framed.send(Message::Finished(None)).await?;
            }
            Message::RequestSecondaryChain => {
                for block in self.secondary.snapshot() {
                    framed.send(Message::Block(block)).await?;
                }
                framed.send(Message::Finished(None)).await?;
            }
            Message::RequestNodes => {
                let nodes = self.store.all_nodes()?;
                framed.send(Message::NodeList(nodes)).await?;
            }
            // Anything else is not a request; answer with a bare Finished
            // so the peer can close cleanly.
            Message::NodeList(_) | Message::Finished(_) => {
                framed.send(Message::Finished(None)).await?;
            }
        }
        Ok(())
    }
}
