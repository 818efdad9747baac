//! The network services handed to the chain manager.

use std::sync::Arc;

use tracing::warn;

use okapi_chain::block::Block;
use okapi_consensus::NetworkOps;
use okapi_state::FinalizedState;

use crate::broadcast::Broadcaster;
use crate::sync::Signup;

/// Implements [`NetworkOps`] on top of the broadcaster and the sync
/// machinery, bridging the synchronous mining thread into the async runtime.
pub struct NetworkHandle {
    runtime: tokio::runtime::Handle,
    store: Arc<FinalizedState>,
    broadcaster: Arc<Broadcaster>,
    signup: Arc<Signup>,
}

impl NetworkHandle {
    pub fn new(
        runtime: tokio::runtime::Handle,
        store: Arc<FinalizedState>,
        broadcaster: Arc<Broadcaster>,
        signup: Arc<Signup>,
    ) -> NetworkHandle {
        NetworkHandle {
            runtime,
            store,
            broadcaster,
            signup,
        }
    }
}

impl NetworkOps for NetworkHandle {
    fn broadcast_block(&self, block: Arc<Block>) {
        let store = self.store.clone();
        let broadcaster = self.broadcaster.clone();
        self.runtime.spawn(async move {
            match store.all_nodes() {
                Ok(nodes) => broadcaster.broadcast_block(block, nodes).await,
                Err(error) => warn!(%error, "cannot read node table for broadcast"),
            }
        });
    }

    fn resync(&self) {
        let signup = self.signup.clone();
        // Called from the mining thread, which is not a runtime worker, so
        // blocking here is safe.
        if let Err(error) = self.runtime.block_on(async move { signup.sync().await }) {
            warn!(%error, "resync failed");
        }
    }
}
