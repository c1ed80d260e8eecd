//! Source-address allowlist for provider callbacks

use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashSet;
use std::sync::Arc;

use super::client_ip;

/// Addresses the payment provider delivers callbacks from
#[derive(Clone, Debug)]
pub struct CallbackAllowlist {
    allowed: Arc<HashSet<String>>,
}

impl CallbackAllowlist {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: Arc::new(addresses.into_iter().map(Into::into).collect()),
        }
    }

    /// An empty allowlist admits every caller
    pub fn is_open(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn permits(&self, address: Option<&str>) -> bool {
        if self.is_open() {
            return true;
        }
        address.is_some_and(|a| self.allowed.contains(a))
    }
}

/// Create the allowlist middleware layer for callback routes
pub fn callback_allowlist_layer(
    allowlist: CallbackAllowlist,
) -> impl Fn(
    Request<Body>,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone
       + Send {
    if allowlist.is_open() {
        tracing::warn!("CALLBACK_ALLOWED_IPS not set, accepting provider callbacks from any source");
    }

    move |request: Request<Body>, next: Next| {
        let allowlist = allowlist.clone();
        Box::pin(async move {
            let source = client_ip(&request);

            if !allowlist.permits(source.as_deref()) {
                tracing::warn!(
                    source = ?source,
                    path = %request.uri().path(),
                    "Rejected callback from unlisted source"
                );
                return (StatusCode::FORBIDDEN, "Callback source not allowed").into_response();
            }

            next.run(request).await
        })
    }
}
