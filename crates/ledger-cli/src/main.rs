use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for a ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:3001)
    #[arg(long, global = true, env = "LEDGER_NODE", default_value = "http://127.0.0.1:3001")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the node's full chain
    Chain,
    /// Mine one block on the node
    Mine,
    /// Pay from the node's wallet
    Send {
        /// Recipient address
        #[arg(long)]
        to: String,
        /// Amount
        #[arg(long)]
        amount: u64,
    },
    /// Balance of the node's wallet, or of ADDRESS
    Balance { address: Option<String> },
    /// The node's wallet address
    Address,
    /// Pending transactions
    Mempool,
    /// Connect the node to another node
    AddPeer {
        /// Peer base URL
        peer: String,
    },
}

#[derive(Serialize)]
struct SendRequest {
    address: String,
    amount: u64,
}

#[derive(Serialize)]
struct PeerRequest {
    peer: String,
}

struct Client {
    base: String,
    http: reqwest::Client,
}

impl Client {
    fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        debug!(%path, "GET");
        let res = self.http.get(format!("{}{path}", self.base)).send().await?;
        Self::body(res).await
    }

    async fn post<B: Serialize>(&self, path: &str, body: Option<&B>) -> Result<Value> {
        debug!(%path, "POST");
        let mut req = self.http.post(format!("{}{path}", self.base));
        if let Some(body) = body {
            req = req.json(body);
        }
        Self::body(req.send().await?).await
    }

    async fn body(res: reqwest::Response) -> Result<Value> {
        let status = res.status();
        let body: Value = res.json().await?;
        if !status.is_success() {
            anyhow::bail!("status: {status}\n{}", serde_json::to_string_pretty(&body)?);
        }
        Ok(body)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = Client::new(&cli.node);
    let out = match cli.cmd {
        Command::Chain => client.get("/blocks").await?,
        Command::Mine => client.post::<()>("/blocks", None).await?,
        Command::Send { to, amount } => {
            let req = SendRequest { address: to, amount };
            client.post("/transactions", Some(&req)).await?
        }
        Command::Balance { address: None } => client.get("/me/balance").await?,
        Command::Balance {
            address: Some(address),
        } => client.get(&format!("/address/{address}")).await?,
        Command::Address => client.get("/me/address").await?,
        Command::Mempool => client.get("/transactions").await?,
        Command::AddPeer { peer } => client.post("/peers", Some(&PeerRequest { peer })).await?,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
