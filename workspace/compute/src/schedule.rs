//! Wall-clock schedule of the pipeline.
//!
//! The schedule is a plain list of [`ScheduledJob`]s built at startup and
//! handed to a [`Scheduler`]. The scheduler evaluates every elapsed minute,
//! expands company-scoped builds over the active companies and runs each
//! (job, company) unit as its own task.
//!
//! ```text
//! every hour  :00  cashflow:day    today          skip if running (10 min)
//! daily    00:05  cashflow:month  current month  skip if running (20 min)
//! daily    00:10  pnl             current month  skip if running (20 min)
//! daily    03:00  debt:snapshot   today          skip if running (15 min)
//! daily    23:55  cashbox balance snapshot, all cashboxes
//! ```

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use sea_orm::DatabaseConnection;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::lock::{lock_key, JobLock, OverlapPolicy};
use crate::query::ReportQueryService;
use crate::reports::{BuildJob, BuildOutcome, ReportBuilder};
use crate::snapshot::CashboxSnapshotJob;
use crate::time::TimeSource;
use crate::FINANCE_TARGET;

/// Longest stretch of missed minutes the scheduler catches up on.
const MAX_CATCH_UP_MINUTES: i64 = 60;

const SNAPSHOT_JOB: &str = "cashbox:snapshot";

/// Cron-like trigger evaluated per minute, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Hourly { minute: u32 },
    DailyAt { hour: u32, minute: u32 },
}

impl Trigger {
    pub fn is_due(&self, at: DateTime<Utc>) -> bool {
        match *self {
            Trigger::Hourly { minute } => at.minute() == minute,
            Trigger::DailyAt { hour, minute } => at.hour() == hour && at.minute() == minute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// A report build for every active company.
    Build(BuildJob),
    /// Balance snapshot of every cashbox.
    CashboxSnapshot,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Build(job) => job.name(),
            Operation::CashboxSnapshot => SNAPSHOT_JOB,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledJob {
    pub trigger: Trigger,
    pub operation: Operation,
    pub overlap: OverlapPolicy,
}

impl ScheduledJob {
    fn build(trigger: Trigger, job: BuildJob) -> Self {
        Self {
            trigger,
            operation: Operation::Build(job),
            overlap: OverlapPolicy::SkipIfRunning {
                window: job.lock_window(),
            },
        }
    }
}

/// The production schedule.
pub fn default_schedule() -> Vec<ScheduledJob> {
    vec![
        ScheduledJob::build(Trigger::Hourly { minute: 0 }, BuildJob::CashflowDay),
        ScheduledJob::build(Trigger::DailyAt { hour: 0, minute: 5 }, BuildJob::CashflowMonth),
        ScheduledJob::build(Trigger::DailyAt { hour: 0, minute: 10 }, BuildJob::Pnl),
        ScheduledJob::build(Trigger::DailyAt { hour: 3, minute: 0 }, BuildJob::DebtSnapshot),
        ScheduledJob {
            trigger: Trigger::DailyAt { hour: 23, minute: 55 },
            operation: Operation::CashboxSnapshot,
            overlap: OverlapPolicy::SkipIfRunning {
                window: Duration::minutes(15),
            },
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitOutcome {
    Completed,
    Skipped,
    Failed,
}

/// Counts of the units one tick ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Scheduler {
    db: DatabaseConnection,
    jobs: Vec<ScheduledJob>,
    company_ids: Vec<i32>,
    time: TimeSource,
    tick_interval: StdDuration,
    builder: ReportBuilder,
}

impl Scheduler {
    pub fn new(db: DatabaseConnection, jobs: Vec<ScheduledJob>, company_ids: Vec<i32>, time: TimeSource) -> Self {
        let builder = ReportBuilder::new(db.clone(), time.clone());
        Self {
            db,
            jobs,
            company_ids,
            time,
            tick_interval: StdDuration::from_secs(30),
            builder,
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: StdDuration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_query_service(mut self, query: ReportQueryService) -> Self {
        self.builder = self.builder.with_query_service(query);
        self
    }

    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    /// Runs forever, evaluating each minute that passed since the last tick.
    ///
    /// Units are left running across ticks, so a slow build never delays a
    /// later trigger; an overlapping run meets the build lock and is skipped.
    pub async fn run(&self) {
        let mut interval = time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut running = JoinSet::new();
        let mut last = truncate_to_minute(self.time.now()) - Duration::minutes(1);
        info!(
            jobs = self.jobs.len(),
            companies = self.company_ids.len(),
            "Scheduler started"
        );

        loop {
            interval.tick().await;
            while let Some(joined) = running.try_join_next() {
                reap(joined);
            }

            let now = truncate_to_minute(self.time.now());
            if now - last > Duration::minutes(MAX_CATCH_UP_MINUTES) {
                warn!(from = %last, to = %now, "Clock jumped, skipping missed minutes");
                last = now - Duration::minutes(1);
            }
            let mut minute = last + Duration::minutes(1);
            while minute <= now {
                self.spawn_due(minute, &mut running);
                minute += Duration::minutes(1);
            }
            if now > last {
                last = now;
            }
        }
    }

    /// Evaluates the schedule for one minute and waits for every unit it starts.
    #[instrument(skip(self))]
    pub async fn tick(&self, at: DateTime<Utc>) -> TickReport {
        let mut units = JoinSet::new();
        self.spawn_due(at, &mut units);

        let mut report = TickReport::default();
        while let Some(joined) = units.join_next().await {
            match reap(joined) {
                UnitOutcome::Completed => report.completed += 1,
                UnitOutcome::Skipped => report.skipped += 1,
                UnitOutcome::Failed => report.failed += 1,
            }
        }
        report
    }

    fn spawn_due(&self, at: DateTime<Utc>, units: &mut JoinSet<(String, UnitOutcome)>) {
        for job in self.jobs.iter().filter(|job| job.trigger.is_due(at)) {
            debug!(job = job.operation.name(), at = %at, "Job due");
            match job.operation {
                Operation::Build(build) => {
                    let period = build.period_for(at.date_naive());
                    for &company_id in &self.company_ids {
                        let builder = self.builder.clone();
                        let overlap = job.overlap;
                        units.spawn(async move {
                            let unit = format!("{}:{}", build.name(), company_id);
                            let outcome = match builder.run_with_policy(build, company_id, &period, overlap).await {
                                Ok(BuildOutcome::Completed { .. }) => UnitOutcome::Completed,
                                Ok(BuildOutcome::Skipped) => UnitOutcome::Skipped,
                                Err(e) => {
                                    // Other failures are logged by the builder itself
                                    if e.is_validation() {
                                        error!(
                                            target: FINANCE_TARGET,
                                            job = build.name(),
                                            company_id,
                                            error = %e,
                                            "Scheduled build rejected"
                                        );
                                    }
                                    UnitOutcome::Failed
                                }
                            };
                            (unit, outcome)
                        });
                    }
                }
                Operation::CashboxSnapshot => {
                    let db = self.db.clone();
                    let overlap = job.overlap;
                    let now = self.time.now();
                    units.spawn(async move {
                        let outcome = match run_snapshot(&db, overlap, now).await {
                            Ok(outcome) => outcome,
                            Err(e) => {
                                error!(target: FINANCE_TARGET, job = SNAPSHOT_JOB, error = %e, "Snapshot run failed");
                                UnitOutcome::Failed
                            }
                        };
                        (SNAPSHOT_JOB.to_string(), outcome)
                    });
                }
            }
        }
    }
}

fn reap(joined: std::result::Result<(String, UnitOutcome), JoinError>) -> UnitOutcome {
    match joined {
        Ok((unit, outcome)) => {
            debug!(unit = %unit, outcome = ?outcome, "Scheduled unit finished");
            outcome
        }
        Err(e) => {
            error!(target: FINANCE_TARGET, error = %e, "Scheduled unit panicked");
            UnitOutcome::Failed
        }
    }
}

async fn run_snapshot(db: &DatabaseConnection, overlap: OverlapPolicy, now: DateTime<Utc>) -> Result<UnitOutcome> {
    let lock = match overlap {
        OverlapPolicy::SkipIfRunning { window } => {
            let key = lock_key(SNAPSHOT_JOB, 0, &now.date_naive().to_string());
            match JobLock::acquire(db, &key, window, now).await? {
                Some(lock) => Some(lock),
                None => {
                    info!(target: FINANCE_TARGET, job = SNAPSHOT_JOB, "Snapshot skipped, already running");
                    return Ok(UnitOutcome::Skipped);
                }
            }
        }
        OverlapPolicy::Allow => None,
    };

    let result = CashboxSnapshotJob::new().run(db, now).await;
    if let Some(lock) = lock {
        lock.release(db).await?;
    }
    let report = result?;
    Ok(if report.failures.is_empty() {
        UnitOutcome::Completed
    } else {
        UnitOutcome::Failed
    })
}

fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::minutes(1)).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use model::entities::{
        build_run, build_run::BuildStatus, cashbox_balance_snapshot, materialized_cashflow_row,
        transaction::Direction,
    };
    use rust_decimal_macros::dec;
    use sea_orm::{EntityTrait, QueryOrder, TransactionTrait};

    fn minute(h: u32, m: u32) -> DateTime<Utc> {
        at(2025, 1, 5, h) + Duration::minutes(i64::from(m))
    }

    #[test]
    fn test_triggers() {
        assert!(Trigger::Hourly { minute: 0 }.is_due(minute(14, 0)));
        assert!(!Trigger::Hourly { minute: 0 }.is_due(minute(14, 1)));
        assert!(Trigger::DailyAt { hour: 0, minute: 5 }.is_due(minute(0, 5)));
        assert!(!Trigger::DailyAt { hour: 0, minute: 5 }.is_due(minute(1, 5)));
    }

    #[test]
    fn test_default_schedule() {
        let schedule = default_schedule();
        let due_at = |at: DateTime<Utc>| -> Vec<&'static str> {
            schedule
                .iter()
                .filter(|job| job.trigger.is_due(at))
                .map(|job| job.operation.name())
                .collect()
        };

        assert_eq!(due_at(minute(0, 0)), vec!["cashflow:day"]);
        assert_eq!(due_at(minute(0, 5)), vec!["cashflow:month"]);
        assert_eq!(due_at(minute(0, 10)), vec!["pnl"]);
        assert_eq!(due_at(minute(3, 0)), vec!["cashflow:day", "debt:snapshot"]);
        assert_eq!(due_at(minute(23, 55)), vec!["cashbox:snapshot"]);
        assert!(due_at(minute(12, 30)).is_empty());

        let pnl = schedule
            .iter()
            .find(|job| job.operation == Operation::Build(BuildJob::Pnl))
            .unwrap();
        assert_eq!(
            pnl.overlap,
            OverlapPolicy::SkipIfRunning {
                window: Duration::minutes(20)
            }
        );
    }

    #[tokio::test]
    async fn test_tick_builds_for_every_active_company() {
        let db = setup_db().await.unwrap();
        let (tenant, first) = new_tenant_company(&db).await.unwrap();
        let second = new_company(&db, &tenant).await.unwrap();
        let a = new_cashbox(&db, &tenant, &first, "EUR").await.unwrap();
        let b = new_cashbox(&db, &tenant, &second, "EUR").await.unwrap();
        new_transaction(&db, &a, Direction::Inflow, dec!(10), minute(9, 0)).await.unwrap();
        new_transaction(&db, &b, Direction::Inflow, dec!(20), minute(9, 0)).await.unwrap();

        let time = TimeSource::fixed(minute(14, 0));
        let scheduler = Scheduler::new(db.clone(), default_schedule(), vec![first.id, second.id], time);

        let report = scheduler.tick(minute(14, 0)).await;
        assert_eq!(report, TickReport { completed: 2, skipped: 0, failed: 0 });
        assert_eq!(materialized_cashflow_row::Entity::find().all(&db).await.unwrap().len(), 2);

        // Nothing is due at half past
        assert_eq!(scheduler.tick(minute(14, 30)).await, TickReport::default());
    }

    #[tokio::test]
    async fn test_failing_company_does_not_stop_the_others() {
        let db = setup_db().await.unwrap();
        let (_, company) = new_tenant_company(&db).await.unwrap();

        let time = TimeSource::fixed(minute(14, 0));
        let scheduler = Scheduler::new(db.clone(), default_schedule(), vec![company.id, 9999], time);

        let report = scheduler.tick(minute(14, 0)).await;
        assert_eq!(report, TickReport { completed: 1, skipped: 0, failed: 1 });
    }

    #[tokio::test]
    async fn test_tick_runs_cashbox_snapshot() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let cashbox = new_cashbox(&db, &tenant, &company, "EUR").await.unwrap();
        new_transaction(&db, &cashbox, Direction::Inflow, dec!(1000), minute(9, 0)).await.unwrap();
        new_transaction(&db, &cashbox, Direction::Outflow, dec!(300), minute(10, 0)).await.unwrap();

        let time = TimeSource::fixed(minute(23, 55));
        let scheduler = Scheduler::new(db.clone(), default_schedule(), vec![], time);

        let report = scheduler.tick(minute(23, 55)).await;
        assert_eq!(report.completed, 1);

        let rows = cashbox_balance_snapshot::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].balance, dec!(700));
    }

    #[tokio::test]
    async fn test_slow_build_does_not_delay_next_trigger() {
        let db = setup_db().await.unwrap();
        let (_, company) = new_tenant_company(&db).await.unwrap();

        let time = TimeSource::fixed(minute(14, 0));
        let jobs = vec![ScheduledJob::build(Trigger::Hourly { minute: 0 }, BuildJob::CashflowDay)];
        let scheduler = Scheduler::new(db.clone(), jobs, vec![company.id], time.clone())
            .with_tick_interval(StdDuration::from_millis(10));

        // Holding the only connection stalls the 14:00 build
        let stall = db.begin().await.unwrap();
        let running = tokio::spawn(async move { scheduler.run().await });
        tokio::time::sleep(StdDuration::from_millis(100)).await;

        time.set(minute(15, 0));
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        stall.commit().await.unwrap();

        let mut runs = Vec::new();
        for _ in 0..200 {
            runs = build_run::Entity::find()
                .order_by_asc(build_run::Column::StartedAt)
                .all(&db)
                .await
                .unwrap();
            if runs.len() == 2 {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(25)).await;
        }
        running.abort();

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].started_at, minute(14, 0));
        assert_eq!(runs[1].started_at, minute(15, 0));
        let mut statuses: Vec<_> = runs.iter().map(|r| r.status).collect();
        statuses.sort_by_key(|status| *status == BuildStatus::Skipped);
        assert_eq!(statuses, vec![BuildStatus::Succeeded, BuildStatus::Skipped]);
    }
}
