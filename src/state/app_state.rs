//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::auth::TokenVerifier;
use crate::balance::BalanceService;
use crate::disbursement::{CallbackReconciler, DisbursementService};
use crate::loan::LoanService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub loan_service: Arc<LoanService>,
    pub disbursement_service: Arc<DisbursementService>,
    pub reconciler: Arc<CallbackReconciler>,
    pub balance_service: Arc<BalanceService>,
    pub token_verifier: Arc<TokenVerifier>,
}

impl AppState {
    pub fn new(
        db_pool: PgPool,
        loan_service: Arc<LoanService>,
        disbursement_service: Arc<DisbursementService>,
        reconciler: Arc<CallbackReconciler>,
        balance_service: Arc<BalanceService>,
        token_verifier: Arc<TokenVerifier>,
    ) -> Self {
        Self {
            db_pool,
            loan_service,
            disbursement_service,
            reconciler,
            balance_service,
            token_verifier,
        }
    }
}

impl FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.token_verifier.clone()
    }
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_service.clone()
    }
}

impl FromRef<AppState> for Arc<DisbursementService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.disbursement_service.clone()
    }
}

impl FromRef<AppState> for Arc<CallbackReconciler> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.reconciler.clone()
    }
}

impl FromRef<AppState> for Arc<BalanceService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.balance_service.clone()
    }
}
