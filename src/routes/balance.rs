//! Balance snapshot routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::balance;
use crate::state::AppState;

pub fn balance_routes() -> Router<AppState> {
    Router::new()
        .route("/api/balances/snapshot", post(balance::request_balance_snapshot))
        .route("/api/balances/latest", get(balance::latest_balance_snapshot))
}
