//! Provider webhook routes, guarded by the source allowlist

use axum::{routing::post, Router};

use crate::handlers::callback;
use crate::middleware::{callback_allowlist_layer, CallbackAllowlist};
use crate::state::AppState;

pub fn callback_routes(allowlist: CallbackAllowlist) -> Router<AppState> {
    Router::new()
        .route("/api/callbacks/b2c/result", post(callback::b2c_result))
        .route("/api/callbacks/b2c/timeout", post(callback::b2c_timeout))
        .route("/api/callbacks/balance/result", post(callback::balance_result))
        .route("/api/callbacks/balance/timeout", post(callback::balance_timeout))
        .route_layer(axum::middleware::from_fn(callback_allowlist_layer(allowlist)))
}
