use anyhow::Result;
use compute::schedule::default_schedule;
use compute::{ReportQueryService, Scheduler, TimeSource};
use tracing::{error, info, trace, warn};

use super::connect;
use crate::config::Settings;

pub async fn run_scheduler(settings: &Settings) -> Result<()> {
    trace!("Entering run_scheduler function");
    let db = connect(&settings.database_url).await?;

    if settings.active_company_ids.is_empty() {
        warn!("No active companies configured; only cashbox snapshots will run");
    }

    let query = ReportQueryService::new(db.clone(), settings.reports.cache_ttl(), settings.reports.cache_capacity);
    let scheduler = Scheduler::new(
        db,
        default_schedule(),
        settings.active_company_ids.clone(),
        TimeSource::system(),
    )
    .with_tick_interval(settings.scheduler.tick_interval())
    .with_query_service(query);

    info!("Running {} scheduled jobs", scheduler.jobs().len());
    tokio::select! {
        _ = scheduler.run() => {}
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Interrupted, stopping scheduler"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
        }
    }
    Ok(())
}
