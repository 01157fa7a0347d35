use chrono::{DateTime, Utc};
use model::entities::{cashbox, cashbox_balance_snapshot};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use tracing::{error, info, instrument};

use crate::balance::cashbox_balance;
use crate::error::Result;
use crate::FINANCE_TARGET;

/// A cashbox whose balance could not be snapshotted in one run.
#[derive(Debug, Clone)]
pub struct SnapshotFailure {
    pub cashbox_id: i32,
    pub company_id: i32,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotReport {
    pub written: usize,
    pub failures: Vec<SnapshotFailure>,
}

/// Appends one balance snapshot row per cashbox.
///
/// Runs are not deduplicated: every run adds rows, building a time series.
#[derive(Debug, Clone, Default)]
pub struct CashboxSnapshotJob;

impl CashboxSnapshotJob {
    pub fn new() -> Self {
        Self
    }

    async fn snapshot_one(
        db: &DatabaseConnection,
        cashbox: &cashbox::Model,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let balance = cashbox_balance(db, cashbox, now).await?;
        cashbox_balance_snapshot::ActiveModel {
            tenant_id: Set(cashbox.tenant_id),
            company_id: Set(cashbox.company_id),
            cashbox_id: Set(cashbox.id),
            balance: Set(balance.amount()),
            currency_code: Set(balance.currency_code().to_string()),
            calculated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;
        Ok(())
    }

    /// Snapshots every cashbox as of `now`. One failing cashbox does not stop
    /// the others; failures are logged after the loop and returned.
    #[instrument(skip(self, db))]
    pub async fn run(&self, db: &DatabaseConnection, now: DateTime<Utc>) -> Result<SnapshotReport> {
        let cashboxes = cashbox::Entity::find()
            .order_by_asc(cashbox::Column::Id)
            .all(db)
            .await?;

        let mut report = SnapshotReport::default();
        for cashbox in &cashboxes {
            match Self::snapshot_one(db, cashbox, now).await {
                Ok(()) => report.written += 1,
                Err(e) => report.failures.push(SnapshotFailure {
                    cashbox_id: cashbox.id,
                    company_id: cashbox.company_id,
                    error: e.to_string(),
                }),
            }
        }

        for failure in &report.failures {
            error!(
                target: FINANCE_TARGET,
                cashbox_id = failure.cashbox_id,
                company_id = failure.company_id,
                error = %failure.error,
                "Cashbox balance snapshot failed"
            );
        }
        info!(
            target: FINANCE_TARGET,
            written = report.written,
            failed = report.failures.len(),
            "Cashbox balance snapshot finished"
        );

        Ok(report)
    }
}
