use anyhow::Result;
use common::PeriodSpec;
use compute::{BuildJob, BuildOutcome, ReportBuilder, TimeSource};
use tracing::{error, info, trace};

use super::connect;
use crate::config::Settings;

pub async fn build(settings: &Settings, job: BuildJob, company_id: i32, period: PeriodSpec) -> Result<()> {
    trace!("Entering build function");
    let db = connect(&settings.database_url).await?;

    let builder = ReportBuilder::new(db, TimeSource::system());
    match builder.run(job, company_id, &period).await {
        Ok(BuildOutcome::Completed { rows }) => {
            info!("{} for company {} and {} wrote {} rows", job, company_id, period, rows);
            println!("{} {} {}: {} rows", job, company_id, period, rows);
        }
        Ok(BuildOutcome::Skipped) => {
            info!("{} for company {} and {} is already running", job, company_id, period);
            println!("{} {} {}: skipped, already running", job, company_id, period);
        }
        Err(e) => {
            error!("Build failed: {}", e);
            return Err(e.into());
        }
    }
    Ok(())
}
