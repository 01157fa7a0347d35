use anyhow::{bail, Result};
use compute::events::{CashboxContext, DomainEvent, EventBus};
use compute::TimeSource;
use tracing::{error, info, trace};

use super::connect;
use crate::config::Settings;

/// Replays the cashbox listeners for one cashbox, e.g. after a manual fix in
/// the ledger.
pub async fn reconcile_cashbox(settings: &Settings, tenant_id: i32, company_id: i32, cashbox_id: i32) -> Result<()> {
    trace!("Entering reconcile_cashbox function");
    let db = connect(&settings.database_url).await?;

    let bus = EventBus::new(db, TimeSource::system()).with_max_attempts(settings.events.max_attempts);
    let report = bus
        .dispatch(&DomainEvent::CashboxBalanceChanged(CashboxContext {
            tenant_id,
            company_id,
            cashbox_id,
            effective_from: None,
        }))
        .await;

    if !report.is_success() {
        for failure in &report.failed {
            error!(
                "{} failed after {} attempts: {}",
                failure.listener.name(),
                failure.attempts,
                failure.error
            );
        }
        bail!("Reconciliation of cashbox {} failed", cashbox_id);
    }
    info!("Cashbox {} reconciled", cashbox_id);
    println!("cashbox {} reconciled", cashbox_id);
    Ok(())
}
