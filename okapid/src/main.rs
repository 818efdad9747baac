//! The Okapi node binary: configuration, process wiring, and shutdown.

mod config;

use std::path::Path;
use std::sync::Arc;

use gumdrop::Options;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use okapi_consensus::ChainManager;
use okapi_network::{Broadcaster, NetworkHandle, PeerError, PeerServer, Signup};
use okapi_state::{ArrivalBuffer, FinalizedState, Mempool, SecondaryChain, UtxoSet};

use config::Config;

#[derive(Debug, Options)]
struct NodeOptions {
    #[options(help = "print this help message")]
    help: bool,

    #[options(help = "path to the configuration file", default = "okapid.toml")]
    config: String,
}

fn main() {
    let options = NodeOptions::parse_args_default_or_exit();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(error) = run(&options) {
        error!(%error, "node failed");
        std::process::exit(1);
    }
}

fn run(options: &NodeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(Path::new(&options.config))?;
    let miner_address = config.miner_address()?;
    let local_address = config.local_address();
    info!(node = %local_address, mine = config.mine(), "starting okapid");

    let store = Arc::new(FinalizedState::open(&config.db.path)?);
    store.add_node(&local_address)?;
    if let Some(parent) = config.parent_address() {
        store.add_node(&parent)?;
    }

    let utxos = Arc::new(UtxoSet::new());
    let mempool = Arc::new(Mempool::new(utxos.clone()));
    let arrivals = Arc::new(ArrivalBuffer::new());
    let secondary = Arc::new(SecondaryChain::new());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let signup = Arc::new(Signup::new(
        store.clone(),
        mempool.clone(),
        secondary.clone(),
        local_address.clone(),
    ));
    let broadcaster = Arc::new(Broadcaster::new(local_address.clone()));
    let network = Arc::new(NetworkHandle::new(
        runtime.handle().clone(),
        store.clone(),
        broadcaster,
        signup.clone(),
    ));

    // Join the network and catch up before doing anything else.
    {
        let signup = signup.clone();
        runtime.block_on(async move {
            signup.bootstrap().await?;
            signup.download_nodes().await?;
            signup.sync().await?;
            Ok::<(), PeerError>(())
        })?;
    }

    let mut chain = ChainManager::new(
        utxos,
        mempool.clone(),
        arrivals.clone(),
        secondary.clone(),
        store.clone(),
        network,
        config.mine(),
    );
    chain.bootstrap(&miner_address)?;

    // The mempool only makes sense against the rebuilt UTXO set.
    runtime.block_on(signup.download_mempool())?;

    // The peer listener answers one request per connection.
    let listener = runtime.block_on(TcpListener::bind(("0.0.0.0", config.node.port)))?;
    let server = Arc::new(PeerServer::new(
        mempool,
        arrivals,
        secondary,
        store,
    ));
    runtime.spawn(server.serve(listener));

    // The mining loop gets its own thread; persistence failures there are
    // fatal.
    std::thread::spawn(move || {
        if let Err(error) = chain.run(&miner_address) {
            error!(%error, "chain manager failed");
            std::process::exit(1);
        }
    });

    runtime.block_on(tokio::signal::ctrl_c())?;
    info!("shutting down");
    Ok(())
}
