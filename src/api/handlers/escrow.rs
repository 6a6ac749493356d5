//! Escrow function, escrow balance and reconciliation handlers.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    EscrowBalanceResponse, EscrowFunctionError, EscrowFunctionRequest, EscrowFunctionResponse,
    ReconciliationResponse,
};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, EscrowError};
use crate::service::EscrowCommand;

/// `POST /functions/v1/escrow-payment` — Escrow function.
///
/// Every failure, malformed JSON included, answers 400 with
/// `{ "error": "..." }`.
#[utoipa::path(
    post,
    path = "/functions/v1/escrow-payment",
    tag = "Escrow",
    summary = "Invoke the escrow function",
    description = "Runs `pay`, `complete` or `refund` for an appointment with the server-held escrow key. `pay` only records the obligation; `complete` pays the agent and `refund` returns the funds to the customer.",
    request_body = EscrowFunctionRequest,
    responses(
        (status = 200, description = "Action applied", body = EscrowFunctionResponse),
        (status = 400, description = "Any failure", body = EscrowFunctionError),
    )
)]
pub async fn escrow_payment(
    State(state): State<AppState>,
    payload: Result<Json<EscrowFunctionRequest>, JsonRejection>,
) -> Response {
    let result = async {
        let Json(req) = payload.map_err(|e| EscrowError::InvalidRequest(e.body_text()))?;
        let command = EscrowCommand::try_from(req)?;
        state.escrow.handle(command).await
    }
    .await;

    match result {
        Ok(outcome) => {
            (StatusCode::OK, Json(EscrowFunctionResponse::from(outcome))).into_response()
        }
        Err(err) => {
            tracing::warn!(code = err.error_code(), error = %err, "escrow function failed");
            (
                StatusCode::BAD_REQUEST,
                Json(EscrowFunctionError {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// `GET /escrow/balance` — Funds held by the escrow.
///
/// # Errors
///
/// Returns [`EscrowError`] when the ledger cannot be queried.
#[utoipa::path(
    get,
    path = "/api/v1/escrow/balance",
    tag = "Escrow",
    summary = "Escrow balance",
    description = "Returns the balance currently held by the escrow.",
    responses(
        (status = 200, description = "Escrow balance", body = EscrowBalanceResponse),
        (status = 502, description = "Ledger query failed", body = ErrorResponse),
    )
)]
pub async fn escrow_balance(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, EscrowError> {
    let signer = state.escrow.signer();
    let balance = signer.escrow_balance().await?;
    Ok(Json(EscrowBalanceResponse {
        escrow_address: signer.address(),
        balance_wei: balance,
        balance_ether: balance.to_ether(),
    }))
}

/// `GET /reconciliation` — Confirmed transfers awaiting a status fix.
///
/// # Errors
///
/// Returns [`EscrowError`] on persistence failures.
#[utoipa::path(
    get,
    path = "/api/v1/reconciliation",
    tag = "Escrow",
    summary = "List unreconciled transfers",
    description = "Transfers that confirmed on the ledger but whose status update failed. These need manual follow-up.",
    responses(
        (status = 200, description = "Unreconciled transfers", body = ReconciliationResponse),
    )
)]
pub async fn list_unreconciled(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, EscrowError> {
    let data = state.store.list_unreconciled().await?;
    Ok(Json(ReconciliationResponse { data }))
}

/// Escrow routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/escrow/balance", get(escrow_balance))
        .route("/reconciliation", get(list_unreconciled))
}

/// The escrow function, mounted at the root.
pub fn function_routes() -> Router<AppState> {
    Router::new().route("/functions/v1/escrow-payment", post(escrow_payment))
}
