//! Request tracing middleware

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::Level;

use super::client_ip;

const CALLBACK_PREFIX: &str = "/api/callbacks/";

/// Log each request with timing; provider webhooks are tagged so they can be
/// filtered apart from operator traffic
pub async fn request_tracing(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = client_ip(&request);
    let callback = path.starts_with(CALLBACK_PREFIX);

    let start = Instant::now();

    tracing::debug!(
        method = %method,
        path = %path,
        client_ip = ?client_ip,
        callback,
        "Request started"
    );

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    macro_rules! completed {
        ($lvl:expr) => {
            tracing::event!(
                $lvl,
                method = %method,
                path = %path,
                client_ip = ?client_ip,
                status,
                duration_ms,
                callback,
                "Request completed"
            )
        };
    }

    if response.status().is_server_error() {
        completed!(Level::ERROR);
    } else if response.status().is_client_error() {
        completed!(Level::WARN);
    } else {
        completed!(Level::INFO);
    }

    response
}
