//! Payment provider webhooks
//!
//! The provider retries until it gets a 200, so duplicates, unknown
//! correlation ids, and unparseable balances are acknowledged. Only storage
//! failures surface as 5xx.

use axum::{extract::State, Json};

use crate::balance::BalanceOutcome;
use crate::disbursement::ReconcileOutcome;
use crate::error::{ApiResult, LendingError};
use crate::provider::{CallbackAck, CallbackEnvelope, ResultPayload, TimeoutPayload};
use crate::state::AppState;

/// POST /api/callbacks/b2c/result
pub async fn b2c_result(
    State(app_state): State<AppState>,
    Json(envelope): Json<CallbackEnvelope<ResultPayload>>,
) -> ApiResult<Json<CallbackAck>> {
    let payload = envelope.into_inner();
    let outcome = app_state.reconciler.on_result(&payload).await?;

    if let ReconcileOutcome::Applied { payout_id, status } = outcome {
        tracing::debug!(payout_id = %payout_id, status = ?status, "B2C result reconciled");
    }
    Ok(Json(CallbackAck::accepted()))
}

/// POST /api/callbacks/b2c/timeout
pub async fn b2c_timeout(
    State(app_state): State<AppState>,
    Json(envelope): Json<CallbackEnvelope<TimeoutPayload>>,
) -> ApiResult<Json<CallbackAck>> {
    let payload = envelope.into_inner();
    app_state.reconciler.on_timeout(&payload).await?;
    Ok(Json(CallbackAck::accepted()))
}

/// POST /api/callbacks/balance/result
pub async fn balance_result(
    State(app_state): State<AppState>,
    Json(envelope): Json<CallbackEnvelope<ResultPayload>>,
) -> ApiResult<Json<CallbackAck>> {
    let payload = envelope.into_inner();

    match app_state.balance_service.record_snapshot(&payload).await {
        Ok(BalanceOutcome::Recorded(snapshot)) => {
            tracing::debug!(snapshot_id = %snapshot.id, "Balance result stored");
        }
        Ok(_) => {}
        // Already logged by the recorder; retrying will not fix the payload
        Err(LendingError::MalformedBalancePayload(_)) => {}
        Err(e) => return Err(e.into()),
    }

    Ok(Json(CallbackAck::accepted()))
}

/// POST /api/callbacks/balance/timeout
pub async fn balance_timeout(
    State(app_state): State<AppState>,
    Json(envelope): Json<CallbackEnvelope<TimeoutPayload>>,
) -> ApiResult<Json<CallbackAck>> {
    app_state
        .balance_service
        .on_timeout(&envelope.into_inner())
        .await?;
    Ok(Json(CallbackAck::accepted()))
}
