//! Scheduled report builds.
//!
//! Each build replaces every materialized row of one company and period
//! inside a single database transaction, so readers see either the old rows
//! or the new ones. [`ReportBuilder`] wraps a build with input validation,
//! the overlap guard and the finance log channel.

pub mod cashflow;
pub mod debt;
pub mod pnl;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use common::PeriodSpec;
use model::entities::{build_run, build_run::BuildStatus, company};
use sea_orm::{ActiveModelTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, Set, TransactionTrait};
use tracing::{error, info, instrument, warn};

use crate::error::{ComputeError, Result};
use crate::lock::{lock_key, JobLock, OverlapPolicy};
use crate::query::ReportQueryService;
use crate::time::TimeSource;
use crate::FINANCE_TARGET;

pub use cashflow::build_cashflow;
pub use debt::build_debt_snapshot;
pub use pnl::build_pnl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildJob {
    CashflowDay,
    CashflowMonth,
    Pnl,
    DebtSnapshot,
}

impl BuildJob {
    pub const ALL: [BuildJob; 4] = [
        BuildJob::CashflowDay,
        BuildJob::CashflowMonth,
        BuildJob::Pnl,
        BuildJob::DebtSnapshot,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuildJob::CashflowDay => "cashflow:day",
            BuildJob::CashflowMonth => "cashflow:month",
            BuildJob::Pnl => "pnl",
            BuildJob::DebtSnapshot => "debt:snapshot",
        }
    }

    /// How long a run may hold its lock before it is considered stale.
    pub fn lock_window(&self) -> Duration {
        match self {
            BuildJob::CashflowDay => Duration::minutes(10),
            BuildJob::CashflowMonth | BuildJob::Pnl => Duration::minutes(20),
            BuildJob::DebtSnapshot => Duration::minutes(15),
        }
    }

    pub fn accepts(&self, period: &PeriodSpec) -> bool {
        match self {
            BuildJob::CashflowDay | BuildJob::DebtSnapshot => period.is_day(),
            BuildJob::CashflowMonth | BuildJob::Pnl => period.is_month(),
        }
    }

    /// The period a scheduled run on `today` covers.
    pub fn period_for(&self, today: NaiveDate) -> PeriodSpec {
        match self {
            BuildJob::CashflowDay | BuildJob::DebtSnapshot => PeriodSpec::Day(today),
            BuildJob::CashflowMonth | BuildJob::Pnl => PeriodSpec::month_of(today),
        }
    }

    async fn build(&self, db: &DatabaseConnection, company: &company::Model, period: &PeriodSpec) -> Result<usize> {
        match self {
            BuildJob::CashflowDay | BuildJob::CashflowMonth => build_cashflow(db, company, period).await,
            BuildJob::Pnl => build_pnl(db, company, period).await,
            BuildJob::DebtSnapshot => build_debt_snapshot(db, company, period).await,
        }
    }
}

impl fmt::Display for BuildJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BuildJob {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], ":").as_str() {
            "cashflow:day" => Ok(BuildJob::CashflowDay),
            "cashflow:month" => Ok(BuildJob::CashflowMonth),
            "pnl" => Ok(BuildJob::Pnl),
            "debt:snapshot" | "debt" => Ok(BuildJob::DebtSnapshot),
            other => Err(ComputeError::Validation(format!("unknown build job '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Completed { rows: usize },
    /// Another run for the same job, company and period holds the lock.
    Skipped,
}

/// Start of `date` as a UTC instant. Days are UTC calendar days.
pub(crate) fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Exclusive upper bound of a period.
pub(crate) fn period_end(period: &PeriodSpec) -> DateTime<Utc> {
    day_start(period.last_day()) + Duration::days(1)
}

/// Commits `txn` when `result` is Ok, otherwise rolls it back.
pub(crate) async fn finish(txn: DatabaseTransaction, result: Result<usize>) -> Result<usize> {
    match result {
        Ok(rows) => {
            txn.commit().await?;
            Ok(rows)
        }
        Err(e) => {
            if let Err(rollback) = txn.rollback().await {
                warn!(error = %rollback, "Rollback of failed build failed");
            }
            Err(e)
        }
    }
}

/// Runs builds for the scheduler and the command line.
#[derive(Clone)]
pub struct ReportBuilder {
    db: DatabaseConnection,
    time: TimeSource,
    query: Option<ReportQueryService>,
}

impl ReportBuilder {
    pub fn new(db: DatabaseConnection, time: TimeSource) -> Self {
        Self { db, time, query: None }
    }

    /// Rebuilt rows invalidate the responses cached by `query`.
    pub fn with_query_service(mut self, query: ReportQueryService) -> Self {
        self.query = Some(query);
        self
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_run(
        &self,
        job: BuildJob,
        company_id: i32,
        period: &PeriodSpec,
        status: BuildStatus,
        rows_written: usize,
        error: Option<String>,
        started_at: DateTime<Utc>,
    ) {
        let record = build_run::ActiveModel {
            job: Set(job.name().to_string()),
            company_id: Set(company_id),
            period: Set(period.to_string()),
            status: Set(status),
            rows_written: Set(rows_written as i64),
            error: Set(error),
            started_at: Set(started_at),
            finished_at: Set(self.time.now()),
            ..Default::default()
        };
        if let Err(e) = record.insert(&self.db).await {
            warn!(job = job.name(), company_id, error = %e, "Could not record build run");
        }
    }

    /// Validates the request, takes the overlap guard and runs one build.
    pub async fn run(&self, job: BuildJob, company_id: i32, period: &PeriodSpec) -> Result<BuildOutcome> {
        let overlap = OverlapPolicy::SkipIfRunning {
            window: job.lock_window(),
        };
        self.run_with_policy(job, company_id, period, overlap).await
    }

    #[instrument(skip(self, job, period), fields(job = job.name(), period = %period))]
    pub async fn run_with_policy(
        &self,
        job: BuildJob,
        company_id: i32,
        period: &PeriodSpec,
        overlap: OverlapPolicy,
    ) -> Result<BuildOutcome> {
        let started_at = self.time.now();
        if company_id <= 0 {
            return Err(ComputeError::Validation(format!(
                "company id must be positive, got {}",
                company_id
            )));
        }
        if !job.accepts(period) {
            return Err(ComputeError::Validation(format!(
                "{} cannot build period {}",
                job.name(),
                period
            )));
        }
        let company = match company::Entity::find_by_id(company_id).one(&self.db).await {
            Ok(Some(company)) => company,
            Ok(None) => {
                return Err(ComputeError::Validation(format!(
                    "company {} does not exist",
                    company_id
                )));
            }
            Err(e) => return Err(self.fail(job, company_id, period, e.into(), started_at).await),
        };

        let key = lock_key(job.name(), company_id, &period.to_string());
        let lock = match overlap {
            OverlapPolicy::SkipIfRunning { window } => {
                let acquired = match JobLock::acquire(&self.db, &key, window, self.time.now()).await {
                    Ok(acquired) => acquired,
                    Err(e) => return Err(self.fail(job, company_id, period, e, started_at).await),
                };
                match acquired {
                    Some(lock) => Some(lock),
                    None => {
                        info!(
                            target: FINANCE_TARGET,
                            job = job.name(),
                            company_id,
                            period = %period,
                            "Build skipped, already running"
                        );
                        self.record_run(job, company_id, period, BuildStatus::Skipped, 0, None, started_at)
                            .await;
                        return Ok(BuildOutcome::Skipped);
                    }
                }
            }
            OverlapPolicy::Allow => None,
        };

        let result = job.build(&self.db, &company, period).await;

        if let Some(lock) = lock {
            if let Err(e) = lock.release(&self.db).await {
                warn!(key = %key, error = %e, "Could not release build lock");
            }
        }

        match result {
            Ok(rows) => {
                self.record_run(job, company_id, period, BuildStatus::Succeeded, rows, None, started_at)
                    .await;
                if let Some(query) = &self.query {
                    query.invalidate();
                }
                info!(
                    target: FINANCE_TARGET,
                    job = job.name(),
                    company_id,
                    period = %period,
                    rows,
                    "Build completed"
                );
                Ok(BuildOutcome::Completed { rows })
            }
            Err(e) => Err(self.fail(job, company_id, period, e, started_at).await),
        }
    }

    /// Records a failed run, logs it on the finance channel and hands the error back.
    async fn fail(
        &self,
        job: BuildJob,
        company_id: i32,
        period: &PeriodSpec,
        error: ComputeError,
        started_at: DateTime<Utc>,
    ) -> ComputeError {
        self.record_run(
            job,
            company_id,
            period,
            BuildStatus::Failed,
            0,
            Some(error.to_string()),
            started_at,
        )
        .await;
        error!(
            target: FINANCE_TARGET,
            job = job.name(),
            company_id,
            period = %period,
            error = %error,
            "Build failed"
        );
        error
    }
}
