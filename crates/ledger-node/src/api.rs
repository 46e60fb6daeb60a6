use crate::p2p::Gossip;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ledger_core::sync::Message;
use ledger_core::{Block, CancellationToken, Node, Transaction, UnspentTxOut};
use serde::{Deserialize, Serialize};
use tokio::task;
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub node: Node,
    pub gossip: Gossip,
    /// Fired on shutdown; in-flight mining requests give up.
    pub shutdown: CancellationToken,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Rejected(#[from] ledger_core::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("worker failed: {0}")]
    Worker(#[from] task::JoinError),
    #[error("node is shutting down")]
    ShuttingDown,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, category) = match &self {
            ApiError::Rejected(err) => {
                let status = match err {
                    ledger_core::Error::Resource(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, err.category())
            }
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Worker(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            ApiError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        };
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        let body = serde_json::json!({ "error": self.to_string(), "category": category });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct SendRequest {
    pub address: String,
    pub amount: u64,
}

#[derive(Deserialize)]
pub struct PeerRequest {
    pub peer: String,
}

#[derive(Serialize)]
struct AddressBody {
    address: String,
}

#[derive(Serialize)]
struct BalanceBody {
    balance: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddressInfo {
    address: String,
    balance: u64,
    unspent_tx_outs: Vec<UnspentTxOut>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/blocks", get(blocks).post(mine))
        .route("/blocks/{hash}", get(block_by_hash))
        .route("/transactions", get(mempool).post(send))
        .route("/transactions/{id}", get(transaction_by_id))
        .route("/me/address", get(my_address))
        .route("/me/balance", get(my_balance))
        .route("/address/{address}", get(address_info))
        .route("/utxos", get(utxos))
        .route("/peers", get(peers).post(add_peer))
        .route("/p2p", post(p2p))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn blocks(State(state): State<AppState>) -> Json<Vec<Block>> {
    Json(state.node.current_chain())
}

async fn mine(State(state): State<AppState>) -> ApiResult<Block> {
    let node = state.node.clone();
    let stop = state.shutdown.clone();
    let block = task::spawn_blocking(move || node.mine_block_until(&stop))
        .await??
        .ok_or(ApiError::ShuttingDown)?;
    state.gossip.broadcast(state.node.latest_message());
    Ok(Json(block))
}

async fn block_by_hash(State(state): State<AppState>, Path(hash): Path<String>) -> ApiResult<Block> {
    state
        .node
        .ledger()
        .find_block_by_hash(&hash)
        .map(Json)
        .ok_or(ApiError::NotFound("block"))
}

async fn mempool(State(state): State<AppState>) -> Json<Vec<Transaction>> {
    Json(state.node.ledger().mempool())
}

async fn send(State(state): State<AppState>, Json(req): Json<SendRequest>) -> ApiResult<Transaction> {
    let tx = state.node.submit_transaction(&req.address, req.amount)?;
    Ok(Json(tx))
}

async fn transaction_by_id(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Transaction> {
    state
        .node
        .ledger()
        .find_transaction(&id)
        .map(Json)
        .ok_or(ApiError::NotFound("transaction"))
}

async fn my_address(State(state): State<AppState>) -> Json<AddressBody> {
    Json(AddressBody {
        address: state.node.address().to_string(),
    })
}

async fn my_balance(State(state): State<AppState>) -> Json<BalanceBody> {
    Json(BalanceBody {
        balance: state.node.balance(),
    })
}

async fn address_info(State(state): State<AppState>, Path(address): Path<String>) -> Json<AddressInfo> {
    let utxos = state.node.ledger().utxos();
    Json(AddressInfo {
        balance: utxos.balance_of(&address),
        unspent_tx_outs: utxos.owned_by(&address).cloned().collect(),
        address,
    })
}

async fn utxos(State(state): State<AppState>) -> Json<Vec<UnspentTxOut>> {
    Json(state.node.ledger().utxos().to_vec())
}

async fn peers(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.gossip.peers())
}

async fn add_peer(State(state): State<AppState>, Json(req): Json<PeerRequest>) -> Json<Vec<String>> {
    state.gossip.add_peer(&req.peer);
    Json(state.gossip.peers())
}

/// A peer's message in; the replies meant for that peer out. Broadcasts go
/// through the outbox.
async fn p2p(State(state): State<AppState>, Json(message): Json<Message>) -> ApiResult<Vec<Message>> {
    let node = state.node.clone();
    let actions = task::spawn_blocking(move || node.handle_message(message)).await?;
    let mut replies = Vec::new();
    let mut rest = Vec::new();
    for action in actions {
        match action {
            ledger_core::sync::Action::Reply(message) => replies.push(message),
            other => rest.push(other),
        }
    }
    state.gossip.dispatch(None, rest);
    Ok(Json(replies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::error::{ConsensusError, LedgerError, ResourceError};

    fn status_of(err: impl Into<ledger_core::Error>) -> StatusCode {
        ApiError::Rejected(err.into()).into_response().status()
    }

    #[test]
    fn rejections_map_to_client_errors() {
        assert_eq!(status_of(ResourceError::InvalidAmount), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status_of(LedgerError::BadSignature { input: 0 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(ConsensusError::GenesisMismatch), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::NotFound("block").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::ShuttingDown.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
