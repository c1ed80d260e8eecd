//! Salary-advance lending server
//!
//! Serves the borrower, approver, and operator APIs and receives the payment
//! provider's result and timeout callbacks.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use salary_advance_server::auth::{validate_capability_table, TokenVerifier};
use salary_advance_server::balance::BalanceService;
use salary_advance_server::config::Config;
use salary_advance_server::db;
use salary_advance_server::disbursement::{CallbackReconciler, DisbursementService};
use salary_advance_server::loan::LoanService;
use salary_advance_server::middleware::CallbackAllowlist;
use salary_advance_server::provider::{HttpProviderClient, ProviderTransport};
use salary_advance_server::routes;
use salary_advance_server::scheduler;
use salary_advance_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting lending server");

    validate_capability_table().context("Capability table is inconsistent")?;

    let db_pool = db::create_pool(&config).await?;
    db::run_migrations(&db_pool).await?;

    let transport: Arc<dyn ProviderTransport> = Arc::new(
        HttpProviderClient::new(config.provider.clone())
            .context("Failed to build payment provider client")?,
    );

    let disbursement_service = Arc::new(DisbursementService::new(
        db_pool.clone(),
        transport.clone(),
        config.provider.clone(),
    ));
    let loan_service = Arc::new(LoanService::new(
        db_pool.clone(),
        disbursement_service.clone(),
    ));
    let reconciler = Arc::new(CallbackReconciler::new(db_pool.clone()));
    let balance_service = Arc::new(BalanceService::new(
        db_pool.clone(),
        transport,
        config.provider.clone(),
    ));
    let token_verifier = Arc::new(TokenVerifier::new(&config.jwt_secret));

    let mut balance_poller = match config.balance_poll_cron.as_deref() {
        Some(cron) => Some(scheduler::start_balance_poller(balance_service.clone(), cron).await?),
        None => {
            tracing::info!("BALANCE_POLL_CRON not set, scheduled balance inquiries disabled");
            None
        }
    };

    let app_state = AppState::new(
        db_pool.clone(),
        loan_service,
        disbursement_service,
        reconciler,
        balance_service,
        token_verifier,
    );

    let allowlist = CallbackAllowlist::new(config.callback_allowed_ips.clone());
    let app = routes::app_router(app_state, allowlist)
        .layer(configure_cors(config.cors_allowed_origins.as_deref()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    if let Some(poller) = balance_poller.as_mut() {
        if let Err(e) = poller.shutdown().await {
            tracing::warn!(error = ?e, "Balance poller did not shut down cleanly");
        }
    }

    db::close_pool(&db_pool).await;
    tracing::info!("Server shutdown complete");

    Ok(())
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let allowed_origins = allowed_origins.unwrap_or_default();

    if allowed_origins.trim().is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
