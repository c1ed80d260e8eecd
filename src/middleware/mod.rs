//! Middleware for the lending API
//!
//! This module provides middleware for request tracing, security headers,
//! callback source validation, and authentication.

pub mod auth;
mod ip_allowlist;
mod security;
mod tracing;

use axum::extract::{ConnectInfo, Request};
use std::net::SocketAddr;

pub use auth::AuthenticatedUser;
pub use ip_allowlist::{callback_allowlist_layer, CallbackAllowlist};
pub use security::security_headers;
pub use tracing::request_tracing;

/// Resolve the caller address: proxy headers first, then the socket peer
pub(crate) fn client_ip<B>(request: &Request<B>) -> Option<String> {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    forwarded
        .or_else(|| {
            request
                .headers()
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
        })
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}
