//! Peer message handling, independent of how messages travel.

use crate::block::Block;
use crate::ledger::Ledger;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Wire form: `{"type": "GET_LATEST" | "GET_ALL" | "CHAIN_RESPONSE", "data": ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    GetLatest,
    GetAll,
    ChainResponse(Vec<Block>),
}

/// What the transport should do after a message was handled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Send back to the peer the message came from.
    Reply(Message),
    /// Send to every known peer.
    Broadcast(Message),
}

pub fn latest_message(ledger: &Ledger) -> Message {
    Message::ChainResponse(vec![ledger.newest_block()])
}

pub fn chain_message(ledger: &Ledger) -> Message {
    Message::ChainResponse(ledger.chain())
}

pub fn handle_message(ledger: &Ledger, message: Message) -> Vec<Action> {
    match message {
        Message::GetLatest => vec![Action::Reply(latest_message(ledger))],
        Message::GetAll => vec![Action::Reply(chain_message(ledger))],
        Message::ChainResponse(blocks) => handle_chain_response(ledger, blocks),
    }
}

/// Blocks are taken in the order the peer sent them; an unordered chain
/// fails validation.
fn handle_chain_response(ledger: &Ledger, blocks: Vec<Block>) -> Vec<Action> {
    let Some(latest) = blocks.last() else {
        debug!("peer sent an empty chain");
        return Vec::new();
    };
    let held = ledger.newest_block();
    if latest.hash == held.hash {
        return Vec::new();
    }

    if latest.previous_hash.as_deref() == Some(held.hash.as_str()) {
        let latest = latest.clone();
        return match ledger.add_block(latest) {
            Ok(()) => vec![Action::Broadcast(latest_message(ledger))],
            Err(err) => {
                warn!(%err, "rejected block from peer");
                Vec::new()
            }
        };
    }

    // A lone genesis block is a whole chain, not a tip to ask about.
    if blocks.len() == 1 && latest.index > 0 {
        debug!(
            peer_height = latest.index,
            local_height = held.index,
            "peer block does not extend ours, asking for its chain"
        );
        return vec![Action::Reply(Message::GetAll)];
    }

    let peer_height = latest.index;
    match ledger.replace_chain(blocks) {
        Ok(()) => {
            info!(peer_height, "adopted chain from peer");
            vec![Action::Broadcast(latest_message(ledger))]
        }
        Err(err) => {
            warn!(%err, "rejected chain from peer");
            Vec::new()
        }
    }
}
