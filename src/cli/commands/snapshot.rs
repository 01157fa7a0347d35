use anyhow::Result;
use compute::{CashboxSnapshotJob, TimeSource};
use tracing::{trace, warn};

use super::connect;
use crate::config::Settings;

pub async fn snapshot_balances(settings: &Settings) -> Result<()> {
    trace!("Entering snapshot_balances function");
    let db = connect(&settings.database_url).await?;

    let report = CashboxSnapshotJob::new().run(&db, TimeSource::system().now()).await?;
    println!("{} snapshots written, {} failed", report.written, report.failures.len());
    for failure in &report.failures {
        warn!("Cashbox {} was not snapshotted: {}", failure.cashbox_id, failure.error);
    }
    Ok(())
}
