//! Boot-time sync ("signup"): join the network and catch up.
//!
//! On boot a node handshakes the peers it remembers, merges their node
//! lists, downloads the mempool, then pulls blocks peer by peer until it
//! reaches the highest height anyone reports, and finally fetches the
//! secondary chain. Peer failures skip to the next peer; there is no
//! backoff.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{info, warn};

use okapi_consensus::check;
use okapi_state::{FinalizedState, Mempool, SecondaryChain};

use crate::constants::CONNECT_TIMEOUT_SECS;
use crate::error::PeerError;
use crate::protocol::{Codec, Message};

type PeerStream = Framed<TcpStream, Codec>;

/// The boot-time network joiner and block downloader.
pub struct Signup {
    store: Arc<FinalizedState>,
    mempool: Arc<Mempool>,
    secondary: Arc<SecondaryChain>,
    local_address: String,
    /// Peers that answered a handshake.
    peers: Mutex<Vec<String>>,
    /// The largest block count any peer has reported; `u32::MAX` until one
    /// does.
    highest_known: AtomicU32,
}

impl Signup {
    pub fn new(
        store: Arc<FinalizedState>,
        mempool: Arc<Mempool>,
        secondary: Arc<SecondaryChain>,
        local_address: String,
    ) -> Signup {
        Signup {
            store,
            mempool,
            secondary,
            local_address,
            peers: Mutex::new(Vec::new()),
            highest_known: AtomicU32::new(u32::MAX),
        }
    }

    /// Handshake everything in the node table and keep the peers that
    /// answer.
    pub async fn bootstrap(&self) -> Result<(), PeerError> {
        let mut alive = Vec::new();
        for node in self.store.all_nodes()? {
            if node == self.local_address {
                continue;
            }
            if self.handshake(&node).await {
                alive.push(node);
            }
        }
        info!(peers = alive.len(), "bootstrap handshake finished");
        self.store.replace_nodes(&alive)?;
        self.store.add_node(&self.local_address)?;
        *self.lock_peers() = alive;
        Ok(())
    }

    /// Ask the first live peer for its node list and handshake any
    /// newcomers.
    pub async fn download_nodes(&self) -> Result<(), PeerError> {
        let peer = match self.first_peer() {
            Some(peer) => peer,
            None => return Ok(()),
        };
        let mut stream = self.request(&peer, Message::RequestNodes).await?;
        let reply = next_message(&mut stream).await?;
        if let Message::NodeList(nodes) = reply {
            let known = self.store.all_nodes()?;
            for node in nodes {
                if node == self.local_address || known.contains(&node) {
                    continue;
                }
                if self.handshake(&node).await {
                    self.store.add_node(&node)?;
                    self.lock_peers().push(node);
                }
            }
        }
        Ok(())
    }

    /// Download the mempool from the first live peer; admission failures
    /// are logged and ignored.
    pub async fn download_mempool(&self) -> Result<(), PeerError> {
        let peer = match self.first_peer() {
            Some(peer) => peer,
            None => return Ok(()),
        };
        let mut stream = self.request(&peer, Message::RequestMempool).await?;
        let mut pending = Vec::new();
        loop {
            match next_message(&mut stream).await? {
                Message::Tx(tx) => pending.push(tx),
                Message::Finished(_) => break,
                other => {
                    warn!(%other, "unexpected message while downloading mempool");
                    break;
                }
            }
        }
        info!(count = pending.len(), "downloaded mempool transactions");
        for tx in pending {
            let id = tx.hash();
            if let Err(error) = self.mempool.add(tx) {
                warn!(tx = %id, %error, "downloaded transaction rejected");
            }
        }
        Ok(())
    }

    /// Download the secondary chain from the first live peer.
    pub async fn download_secondary_chain(&self) -> Result<(), PeerError> {
        let peer = match self.first_peer() {
            Some(peer) => peer,
            None => return Ok(()),
        };
        let mut stream = self.request(&peer, Message::RequestSecondaryChain).await?;
        loop {
            match next_message(&mut stream).await? {
                Message::Block(block) => self.secondary.insert(block),
                Message::Finished(_) => break,
                other => {
                    warn!(%other, "unexpected message while downloading secondary chain");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Pull blocks from every live peer, round-robin, until the local chain
    /// reaches the highest count any peer reports or no peer makes
    /// progress.
    pub async fn download_blocks(&self) -> Result<(), PeerError> {
        loop {
            let peers = self.lock_peers().clone();
            if peers.is_empty() {
                return Ok(());
            }
            let mut progressed = false;
            for peer in peers {
                if self.caught_up()? {
                    return Ok(());
                }
                if peer == self.local_address {
                    continue;
                }
                match self.download_blocks_from(&peer).await {
                    Ok(received) => progressed |= received > 0,
                    Err(error) => warn!(peer = %peer, %error, "block download failed"),
                }
            }
            if self.caught_up()? || !progressed {
                return Ok(());
            }
        }
    }

    /// Run a whole catch-up pass: blocks, then the secondary chain.
    pub async fn sync(&self) -> Result<(), PeerError> {
        if self.lock_peers().is_empty() {
            return Ok(());
        }
        self.download_blocks().await?;
        self.download_secondary_chain().await
    }

    async fn download_blocks_from(&self, peer: &str) -> Result<usize, PeerError> {
        let mut last = self.store.last_block()?;
        let start = last.as_ref().map(|block| block.height.next().0).unwrap_or(0);
        let mut stream = self
            .request(
                peer,
                Message::RequestBlocks {
                    start_height: okapi_chain::block::Height(start),
                    stop_hash: None,
                },
            )
            .await?;

        let mut received = 0usize;
        loop {
            match next_message(&mut stream).await? {
                Message::Block(block) => {
                    if check::extends(&block, last.as_deref()) {
                        self.store.save_block(&block)?;
                        info!(height = block.height.0, "block received");
                        last = Some(block);
                        received += 1;
                    } else if self.secondary.contains(&block.hash()) {
                        // A block we already shelved keeps coming back: the
                        // recent canonical run is poisoned, drop it and
                        // refetch.
                        warn!(height = block.height.0, "invalid block matches shelved fork, rewinding");
                        let to = block.height.0.saturating_sub(1);
                        let from = block.height.0.saturating_sub(50);
                        self.store.delete_blocks(
                            okapi_chain::block::Height(from),
                            okapi_chain::block::Height(to),
                        )?;
                        break;
                    } else {
                        warn!(height = block.height.0, "invalid block during sync, shelving");
                        self.secondary.insert(block);
                    }
                }
                Message::Finished(param) => {
                    if let Some(count) = param {
                        self.highest_known.store(count, Ordering::SeqCst);
                    }
                    break;
                }
                other => {
                    warn!(%other, "unexpected message while downloading blocks");
                    break;
                }
            }
        }
        Ok(received)
    }

    /// Probe a peer with a handshake envelope.
    pub async fn handshake(&self, address: &str) -> bool {
        let exchange = async {
            let mut stream = self.request(address, Message::Handshake).await?;
            match next_message(&mut stream).await? {
                Message::Handshake => Ok(()),
                _ => Err(PeerError::ConnectionClosed),
            }
        };
        match exchange.await {
            Ok(()) => true,
            Err(error) => {
                warn!(peer = %address, %error, "handshake failed");
                false
            }
        }
    }

    async fn request(&self, address: &str, message: Message) -> Result<PeerStream, PeerError> {
        let connect = TcpStream::connect(address);
        let stream = tokio::time::timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS), connect)
            .await
            .map_err(|_| PeerError::ConnectionClosed)??;
        let mut framed = Framed::new(
            stream,
            Codec::builder()
                .with_metrics_label(address.to_string())
                .finish(),
        );
        framed.send(message).await?;
        Ok(framed)
    }

    fn caught_up(&self) -> Result<bool, PeerError> {
        let highest = self.highest_known.load(Ordering::SeqCst);
        if highest == u32::MAX {
            return Ok(false);
        }
        Ok(self.store.block_count() >= highest)
    }

    fn first_peer(&self) -> Option<String> {
        self.lock_peers().first().cloned()
    }

    fn lock_peers(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.peers.lock().expect("peer list mutex poisoned")
    }
}

async fn next_message(stream: &mut PeerStream) -> Result<Message, PeerError> {
    match stream.next().await {
        Some(result) => result,
        None => Err(PeerError::ConnectionClosed),
    }
}
