//! Route definitions for the lending API

mod balance;
mod callback;
mod loan;

use axum::{routing::get, Router};

pub use balance::balance_routes;
pub use callback::callback_routes;
pub use loan::loan_routes;

use crate::handlers;
use crate::middleware::{self, CallbackAllowlist};
use crate::state::AppState;

/// Full application router without CORS, which depends on deployment config
pub fn app_router(app_state: AppState, allowlist: CallbackAllowlist) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(loan_routes())
        .merge(balance_routes())
        .merge(callback_routes(allowlist))
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
}
