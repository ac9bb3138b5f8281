//! Axum route handlers for the relay HTTP API.

use alloy::primitives::{Address, B256};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::credential::Credential;
use crate::election::ElectionClient;
use crate::error::TxError;
use crate::tx::TransactionRecord;

pub struct AppState {
    pub client: ElectionClient,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(client: ElectionClient) -> Self {
        Self {
            client,
            start_time: Instant::now(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/vote/cast", post(cast_vote))
        .route("/tx/:id", get(tx_status))
        .route("/election", get(election))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub voter_address: String,
    pub candidate_address: String,
    #[serde(alias = "privateKey")]
    pub credential: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElectionStatus {
    pub active: bool,
    /// `None` when the contract has no winner to report yet.
    pub winner: Option<Address>,
    pub uptime_secs: u64,
}

fn status_for(error: &TxError) -> StatusCode {
    match error {
        TxError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        TxError::RevertedOnChain { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TxError::ConfirmationTimeout { .. } => StatusCode::ACCEPTED,
        TxError::SubmissionFailed { .. }
        | TxError::TransientNetworkError { .. }
        | TxError::QueryFailed { .. } => StatusCode::BAD_GATEWAY,
        TxError::NotFound(_) => StatusCode::NOT_FOUND,
        TxError::Cancelled(_) | TxError::StillPending(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_address(field: &str, raw: &str) -> Result<Address, TxError> {
    raw.trim()
        .parse()
        .map_err(|_| TxError::InvalidRequest(format!("{field} is not a valid address")))
}

async fn submit_vote(
    state: &AppState,
    payload: Result<Json<CastVoteRequest>, JsonRejection>,
) -> Result<TransactionRecord, TxError> {
    let Json(req) = payload.map_err(|e| TxError::InvalidRequest(e.body_text()))?;
    let voter = parse_address("voterAddress", &req.voter_address)?;
    let candidate = parse_address("candidateAddress", &req.candidate_address)?;
    let credential = Credential::from_private_key(&req.credential)?;
    state.client.cast_vote(voter, candidate, credential).await
}

// POST /vote/cast
pub async fn cast_vote(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CastVoteRequest>, JsonRejection>,
) -> (StatusCode, Json<CastVoteResponse>) {
    match submit_vote(&state, payload).await {
        Ok(record) => {
            info!(tx_hash = ?record.id(), "Vote confirmed");
            (
                StatusCode::OK,
                Json(CastVoteResponse {
                    success: true,
                    transaction_id: Some(record.id()),
                    error: None,
                }),
            )
        }
        Err(e) => {
            warn!(error = %e, "Vote not confirmed");
            (
                status_for(&e),
                Json(CastVoteResponse {
                    success: false,
                    transaction_id: e.transaction_id(),
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

// GET /tx/:id
pub async fn tx_status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Ok(id) = id.parse::<B256>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: format!("{id} is not a transaction hash"),
            }),
        )
            .into_response();
    };

    match state.client.manager().get_status(id).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => (
            status_for(&e),
            Json(ErrorBody {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

// GET /election
pub async fn election(State(state): State<Arc<AppState>>) -> Response {
    let active = match state.client.election_active().await {
        Ok(active) => active,
        Err(e) => {
            return (
                status_for(&e),
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    };

    // getWinner reverts while no result is available; report that as no winner.
    let winner = match state.client.winner().await {
        Ok(winner) if winner != Address::ZERO => Some(winner),
        Ok(_) | Err(TxError::QueryFailed { .. }) => None,
        Err(e) => {
            return (
                status_for(&e),
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    };

    (
        StatusCode::OK,
        Json(ElectionStatus {
            active,
            winner,
            uptime_secs: state.start_time.elapsed().as_secs(),
        }),
    )
        .into_response()
}
