//! Balance snapshot handlers

use axum::{extract::State, http::StatusCode, Json};

use crate::auth::{Action, Resource};
use crate::balance::{AccountBalanceSnapshot, BalanceInquiry};
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::models::ApiResponse;
use crate::state::AppState;

/// POST /api/balances/snapshot - ask the provider for a fresh balance
pub async fn request_balance_snapshot(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<(StatusCode, Json<ApiResponse<BalanceInquiry>>)> {
    user.require(Resource::Balance, Action::Create)?;

    let inquiry = app_state
        .balance_service
        .request_snapshot(user.tenant_id)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok(inquiry))))
}

/// GET /api/balances/latest
pub async fn latest_balance_snapshot(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<AccountBalanceSnapshot>>> {
    user.require(Resource::Balance, Action::Read)?;

    app_state
        .balance_service
        .latest_snapshot(user.tenant_id)
        .await?
        .map(|snapshot| Json(ApiResponse::ok(snapshot)))
        .ok_or_else(|| ApiError::NotFound("No balance snapshot recorded yet".to_string()))
}
