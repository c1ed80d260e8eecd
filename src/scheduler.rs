//! Periodic balance inquiries

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::balance::BalanceService;

/// Start a scheduler that requests a balance snapshot for every tenant on `cron`
/// (six fields, seconds first). The returned handle must be kept alive and
/// shut down on exit.
pub async fn start_balance_poller(service: Arc<BalanceService>, cron: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow!("failed to create scheduler: {:?}", e))?;

    let job = Job::new_async(cron, move |_id, _scheduler| {
        let service = service.clone();
        Box::pin(async move {
            match poll_all_tenants(&service).await {
                Ok(requested) => {
                    tracing::info!(tenants = requested, "Scheduled balance inquiries submitted")
                }
                Err(e) => tracing::error!(error = %e, "Scheduled balance inquiry run failed"),
            }
        })
    })
    .map_err(|e| anyhow!("invalid BALANCE_POLL_CRON '{}': {:?}", cron, e))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| anyhow!("failed to register balance job: {:?}", e))?;
    scheduler
        .start()
        .await
        .map_err(|e| anyhow!("failed to start scheduler: {:?}", e))?;

    tracing::info!(cron = %cron, "Balance poller scheduled");
    Ok(scheduler)
}

/// Request one snapshot per tenant; a failing tenant does not stop the others
pub async fn poll_all_tenants(service: &BalanceService) -> Result<usize> {
    let tenants = service
        .active_tenants()
        .await
        .context("failed to list tenants for balance polling")?;

    let mut requested = 0;
    for tenant_id in tenants {
        match service.request_snapshot(tenant_id).await {
            Ok(_) => requested += 1,
            Err(e) => {
                tracing::warn!(tenant_id = %tenant_id, error = %e, "Balance inquiry failed")
            }
        }
    }

    Ok(requested)
}
