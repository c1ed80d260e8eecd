//! Loan, capacity, and payout HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::audit::LoanAuditLog;
use crate::auth::{Action, Resource};
use crate::disbursement::{DisbursementResult, LoanPayout};
use crate::error::{ApiError, ApiResult};
use crate::loan::{
    ApprovalOutcome, BorrowCapacity, CreateLoanRequest, ListLoansQuery, Loan, RejectLoanRequest,
};
use crate::middleware::AuthenticatedUser;
use crate::models::{ApiResponse, PageQuery};
use crate::state::AppState;

/// GET /api/capacity/me
pub async fn get_my_capacity(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<BorrowCapacity>>> {
    user.require(Resource::Capacity, Action::Read)?;

    let capacity = app_state.loan_service.capacity(user.user_id).await?;
    Ok(Json(ApiResponse::ok(capacity)))
}

/// POST /api/loans
pub async fn create_loan(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateLoanRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Loan>>)> {
    user.require(Resource::Loan, Action::Create)?;
    request.validate()?;

    let loan = app_state
        .loan_service
        .request_loan(&user.identity(), request)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(loan))))
}

/// GET /api/loans
pub async fn list_loans(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Query(mut query): Query<ListLoansQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Loan>>>> {
    user.require(Resource::Loan, Action::Read)?;

    if user.is_borrower() {
        query.user_id = Some(user.user_id);
    }

    let loans = app_state
        .loan_service
        .list_loans(&user.identity(), &query)
        .await?;
    Ok(Json(ApiResponse::ok(loans)))
}

/// GET /api/loans/:id
pub async fn get_loan(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    user.require(Resource::Loan, Action::Read)?;

    let loan = load_visible_loan(&app_state, &user, loan_id).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

/// POST /api/loans/:id/approve
pub async fn approve_loan(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<ApprovalOutcome>>> {
    user.require(Resource::Loan, Action::Approve)?;

    let outcome = app_state
        .loan_service
        .approve(&user.identity(), loan_id)
        .await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// POST /api/loans/:id/reject
pub async fn reject_loan(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
    Json(request): Json<RejectLoanRequest>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    user.require(Resource::Loan, Action::Reject)?;
    request.validate()?;

    let loan = app_state
        .loan_service
        .reject(&user.identity(), loan_id, request.reason)
        .await?;
    Ok(Json(ApiResponse::ok(loan)))
}

/// POST /api/loans/:id/disburse - operator retry of an approved or failed disbursement
pub async fn disburse_loan(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<ApiResponse<DisbursementResult>>)> {
    user.require(Resource::Payout, Action::Disburse)?;

    let result = app_state
        .disbursement_service
        .disburse(&user.identity(), loan_id)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok(result))))
}

/// GET /api/loans/:id/payouts
pub async fn list_loan_payouts(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<LoanPayout>>>> {
    user.require(Resource::Payout, Action::Read)?;

    let payouts = app_state
        .disbursement_service
        .list_for_loan(&user.identity(), loan_id)
        .await?;
    Ok(Json(ApiResponse::ok(payouts)))
}

/// GET /api/loans/:id/audit
pub async fn get_loan_audit(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<LoanAuditLog>>>> {
    user.require(Resource::Loan, Action::Read)?;
    load_visible_loan(&app_state, &user, loan_id).await?;

    let entries = app_state
        .loan_service
        .audit_trail(&user.identity(), loan_id)
        .await?;
    Ok(Json(ApiResponse::ok(entries)))
}

/// GET /api/payouts/unconfirmed
pub async fn list_unconfirmed_payouts(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<ApiResponse<Vec<LoanPayout>>>> {
    user.require(Resource::Payout, Action::Read)?;

    let (limit, offset) = page.limit_offset();
    let payouts = app_state
        .disbursement_service
        .list_unconfirmed(&user.identity(), limit, offset)
        .await?;
    Ok(Json(ApiResponse::ok(payouts)))
}

async fn load_visible_loan(
    app_state: &AppState,
    user: &AuthenticatedUser,
    loan_id: Uuid,
) -> Result<Loan, ApiError> {
    let loan = app_state
        .loan_service
        .get_loan(&user.identity(), loan_id)
        .await?;

    if user.is_borrower() && loan.user_id != user.user_id {
        return Err(ApiError::NotFound(format!("loan {}", loan_id)));
    }
    Ok(loan)
}
