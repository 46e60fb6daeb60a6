mod api;
mod constants;
mod keys;
mod p2p;

use api::AppState;
use clap::{Args as ClapArgs, Parser};
use constants::{DEFAULT_KEY_FILE, DEFAULT_LISTEN};
use ledger_core::constants::{
    BLOCK_GENERATION_INTERVAL_MS, COINBASE_AMOUNT, DIFFICULTY_ADJUSTMENT_INTERVAL,
    TIMESTAMP_TOLERANCE_MS,
};
use ledger_core::{CancellationToken, ChainParams, MinerConfig, Node};
use p2p::Gossip;
use std::{net::SocketAddr, path::PathBuf};
use tokio::task;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "ledger-node", about = "Proof-of-work UTXO ledger node")]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:3001
    #[arg(long, env = "LEDGER_LISTEN", default_value = DEFAULT_LISTEN)]
    listen: SocketAddr,

    /// Peer base URLs to connect to at startup, comma separated
    #[arg(long, env = "LEDGER_PEERS", value_delimiter = ',')]
    peers: Vec<String>,

    /// Hex secp256k1 secret key; created if missing
    #[arg(long, env = "LEDGER_KEY_FILE", default_value = DEFAULT_KEY_FILE)]
    key_file: PathBuf,

    /// Keep mining blocks in the background
    #[arg(long, env = "LEDGER_AUTO_MINE")]
    auto_mine: bool,

    /// Spread the nonce search over all cores
    #[arg(long, env = "LEDGER_PARALLEL_MINING")]
    parallel_mining: bool,

    #[command(flatten)]
    chain: ChainArgs,
}

#[derive(ClapArgs, Debug)]
struct ChainArgs {
    #[arg(long, env = "LEDGER_COINBASE_AMOUNT", default_value_t = COINBASE_AMOUNT)]
    coinbase_amount: u64,

    #[arg(long, env = "LEDGER_BLOCK_INTERVAL_MS", default_value_t = BLOCK_GENERATION_INTERVAL_MS)]
    block_generation_interval_ms: u64,

    #[arg(long, env = "LEDGER_ADJUSTMENT_INTERVAL", default_value_t = DIFFICULTY_ADJUSTMENT_INTERVAL)]
    difficulty_adjustment_interval: u64,

    #[arg(long, env = "LEDGER_TIMESTAMP_TOLERANCE_MS", default_value_t = TIMESTAMP_TOLERANCE_MS)]
    timestamp_tolerance_ms: u64,
}

impl From<ChainArgs> for ChainParams {
    fn from(args: ChainArgs) -> Self {
        ChainParams {
            coinbase_amount: args.coinbase_amount,
            block_generation_interval_ms: args.block_generation_interval_ms,
            difficulty_adjustment_interval: args.difficulty_adjustment_interval,
            timestamp_tolerance_ms: args.timestamp_tolerance_ms,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let wallet = keys::load_or_create(&args.key_file).await?;
    let params = ChainParams::from(args.chain);
    info!(?params, address = wallet.address(), "starting node");

    let node = Node::new(
        wallet,
        params,
        MinerConfig {
            parallel: args.parallel_mining,
        },
    );
    let gossip = Gossip::spawn(node.clone())?;
    for peer in &args.peers {
        gossip.add_peer(peer);
    }
    let shutdown = CancellationToken::new();
    let auto_miner = args
        .auto_mine
        .then(|| spawn_auto_miner(node.clone(), gossip.clone(), shutdown.clone()));

    let app = api::router(AppState {
        node: node.clone(),
        gossip,
        shutdown: shutdown.clone(),
    });
    info!("ledger-node listening on http://{}", args.listen);
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(node.clone(), shutdown.clone()))
        .await?;

    node.stop_mining(&shutdown);
    if let Some(auto_miner) = auto_miner {
        auto_miner.await?;
    }
    Ok(())
}

/// Mines back to back on a blocking worker, announcing every block, until
/// `stop` fires.
fn spawn_auto_miner(node: Node, gossip: Gossip, stop: CancellationToken) -> task::JoinHandle<()> {
    task::spawn_blocking(move || loop {
        match node.mine_block_until(&stop) {
            Ok(Some(_)) => gossip.broadcast(node.latest_message()),
            Ok(None) => {
                info!("auto-miner stopped");
                return;
            }
            Err(err) => {
                warn!(%err, "auto-mine failed, retrying");
                std::thread::sleep(std::time::Duration::from_secs(1));
            }
        }
    })
}

async fn shutdown_signal(node: Node, stop: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
    node.stop_mining(&stop);
}
