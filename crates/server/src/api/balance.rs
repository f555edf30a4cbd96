use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{error, warn};

use crate::api::{AppState, MessageResponse};
use crate::balance::{compute_snapshot, write_back_balance, BalanceError};
use common::types::BalanceSnapshot;

type ApiError = (StatusCode, Json<MessageResponse>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(MessageResponse {
            message: message.into(),
        }),
    )
}

/// Compute a fresh valuation snapshot for the agent's wallet and persist
/// the USD/SOL totals onto the agent row before returning it.
pub async fn get_wallet_balance(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceSnapshot>, ApiError> {
    let uid = user_id.clone();
    let wallet = state
        .db
        .call_named("agents.wallet_address", move |conn| {
            let row = conn
                .query_row(
                    "SELECT wallet_address FROM agents WHERE user_id = ?1",
                    rusqlite::params![uid],
                    |row| row.get::<_, Option<String>>(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            Ok(row)
        })
        .await
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "failed to load wallet address");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to load wallet address",
            )
        })?;

    // Outer None: no agent row. Inner None: agent exists but never
    // connected a wallet. Both read as "nothing to value".
    let Some(Some(address)) = wallet else {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            "Wallet address not found",
        ));
    };

    let snapshot = compute_snapshot(
        state.ledger.as_ref(),
        state.market.as_ref(),
        &address,
        state.max_concurrent_lookups,
    )
    .await
    .map_err(|e| match e {
        BalanceError::InvalidAddress(addr) => {
            warn!(user_id = %user_id, address = %addr, "stored wallet address is invalid");
            error_response(
                StatusCode::BAD_REQUEST,
                format!("invalid wallet address: {addr}"),
            )
        }
        BalanceError::LedgerUnavailable(source) => {
            error!(user_id = %user_id, error = %source, "ledger unavailable");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "ledger unavailable")
        }
    })?;

    write_back_balance(&state.db, &user_id, &snapshot)
        .await
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "failed to persist balance");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to persist balance",
            )
        })?;

    Ok(Json(snapshot))
}
