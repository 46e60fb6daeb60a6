//! Peer transport over HTTP. A message is POSTed to a peer's `/p2p` route and
//! the peer's replies come back in the response body.

use crate::constants::PEER_TIMEOUT_SECS;
use ledger_core::sync::{Action, Message};
use ledger_core::Node;
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tracing::{debug, info, warn};

enum Envelope {
    To(String, Message),
    All(Message),
}

/// Known peers plus the queue of outgoing messages. Cheap to clone.
#[derive(Clone)]
pub struct Gossip {
    node: Node,
    peers: Arc<RwLock<BTreeSet<String>>>,
    client: reqwest::Client,
    outbox: mpsc::UnboundedSender<Envelope>,
}

impl Gossip {
    /// Starts the delivery task. Must be called inside a tokio runtime.
    pub fn spawn(node: Node) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PEER_TIMEOUT_SECS))
            .build()?;
        let (outbox, inbox) = mpsc::unbounded_channel();
        let gossip = Self {
            node,
            peers: Arc::default(),
            client,
            outbox,
        };
        tokio::spawn(gossip.clone().run(inbox));
        Ok(gossip)
    }

    pub fn peers(&self) -> Vec<String> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Registers `url` and asks it for its newest block.
    pub fn add_peer(&self, url: &str) {
        let url = url.trim_end_matches('/').to_string();
        let added = self
            .peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone());
        if added {
            info!(peer = %url, "added peer");
        }
        self.send(url, Message::GetLatest);
    }

    pub fn send(&self, url: String, message: Message) {
        self.enqueue(Envelope::To(url, message));
    }

    pub fn broadcast(&self, message: Message) {
        self.enqueue(Envelope::All(message));
    }

    /// Routes the outcome of handling a message that came from `origin`.
    pub fn dispatch(&self, origin: Option<&str>, actions: Vec<Action>) {
        for action in actions {
            match (action, origin) {
                (Action::Reply(message), Some(origin)) => self.send(origin.to_string(), message),
                (Action::Reply(_), None) => {}
                (Action::Broadcast(message), _) => self.broadcast(message),
            }
        }
    }

    fn enqueue(&self, envelope: Envelope) {
        if self.outbox.send(envelope).is_err() {
            warn!("peer outbox closed, dropping message");
        }
    }

    async fn run(self, mut inbox: mpsc::UnboundedReceiver<Envelope>) {
        while let Some(envelope) = inbox.recv().await {
            match envelope {
                Envelope::To(url, message) => self.deliver(url, message),
                Envelope::All(message) => {
                    for url in self.peers() {
                        self.deliver(url, message.clone());
                    }
                }
            }
        }
    }

    /// One task per delivery, so a dead peer never holds up the others.
    fn deliver(&self, url: String, message: Message) {
        let gossip = self.clone();
        tokio::spawn(async move {
            let replies = match gossip.post(&url, &message).await {
                Ok(replies) => replies,
                Err(err) => {
                    warn!(peer = %url, %err, "peer delivery failed");
                    return;
                }
            };
            for reply in replies {
                let node = gossip.node.clone();
                match task::spawn_blocking(move || node.handle_message(reply)).await {
                    Ok(actions) => gossip.dispatch(Some(&url), actions),
                    Err(err) => warn!(peer = %url, %err, "handling peer reply panicked"),
                }
            }
        });
    }

    async fn post(&self, url: &str, message: &Message) -> reqwest::Result<Vec<Message>> {
        debug!(peer = %url, kind = kind(message), "sending");
        self.client
            .post(format!("{url}/p2p"))
            .json(message)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

fn kind(message: &Message) -> &'static str {
    match message {
        Message::GetLatest => "GET_LATEST",
        Message::GetAll => "GET_ALL",
        Message::ChainResponse(_) => "CHAIN_RESPONSE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{self, AppState};
    use ledger_core::{CancellationToken, ChainParams, MinerConfig, Wallet};

    fn node() -> Node {
        Node::new(Wallet::generate(), ChainParams::default(), MinerConfig::default())
    }

    /// Serves `node` on an ephemeral port; returns its base URL and gossip.
    async fn serve(node: Node) -> anyhow::Result<(String, Gossip)> {
        let gossip = Gossip::spawn(node.clone())?;
        let app = api::router(AppState {
            node,
            gossip: gossip.clone(),
            shutdown: CancellationToken::new(),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        tokio::spawn(async move { axum::serve(listener, app).await });
        Ok((url, gossip))
    }

    async fn wait_for_head(node: &Node, head: &ledger_core::Block) -> anyhow::Result<()> {
        tokio::time::timeout(Duration::from_secs(10), async {
            while node.ledger().newest_block() != *head {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn announced_block_reaches_peer() -> anyhow::Result<()> {
        let (a, b) = (node(), node());
        let (_, a_gossip) = serve(a.clone()).await?;
        let (b_url, _) = serve(b.clone()).await?;
        a_gossip.add_peer(&b_url);
        assert_eq!(a_gossip.peers(), vec![b_url]);

        let miner = a.clone();
        let block = task::spawn_blocking(move || miner.mine_block()).await??;
        a_gossip.broadcast(a.latest_message());
        wait_for_head(&b, &block).await
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn one_way_peer_fetches_the_gap_from_the_sender() -> anyhow::Result<()> {
        let (a, b) = (node(), node());
        let (_, a_gossip) = serve(a.clone()).await?;
        let (b_url, b_gossip) = serve(b.clone()).await?;

        let miner = a.clone();
        task::spawn_blocking(move || -> ledger_core::Result<()> {
            for _ in 0..3 {
                miner.mine_block()?;
            }
            Ok(())
        })
        .await??;

        // b does not know a; only a's announcement of its tip reaches b.
        a_gossip.add_peer(&b_url);
        a_gossip.broadcast(a.latest_message());
        wait_for_head(&b, &a.ledger().newest_block()).await?;
        assert_eq!(b.current_chain(), a.current_chain());
        assert!(b_gossip.peers().is_empty());
        Ok(())
    }

    #[test]
    fn message_kinds_match_wire_names() {
        assert_eq!(kind(&Message::GetLatest), "GET_LATEST");
        assert_eq!(kind(&Message::GetAll), "GET_ALL");
        assert_eq!(kind(&Message::ChainResponse(Vec::new())), "CHAIN_RESPONSE");
    }
}
