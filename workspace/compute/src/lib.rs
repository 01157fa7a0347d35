//! Finance pipeline: balances, domain events with their recalculation
//! listeners, scheduled report builds and the read side over materialized rows.

pub mod balance;
pub mod error;
pub mod events;
pub mod ledger;
pub mod listeners;
pub mod lock;
pub mod query;
pub mod reports;
pub mod schedule;
pub mod snapshot;
pub mod time;

#[cfg(test)]
pub mod testing;

/// Tracing target of the finance log channel. Listener failures, build
/// outcomes and snapshot failures are all reported here.
pub const FINANCE_TARGET: &str = "finance";

pub use error::{ComputeError, Result};
pub use events::{DomainEvent, EventBus, EventQueue, EventSink};
pub use ledger::LedgerService;
pub use query::{ReportQueryService, ReportRequest};
pub use reports::{BuildJob, BuildOutcome, ReportBuilder};
pub use schedule::Scheduler;
pub use snapshot::CashboxSnapshotJob;
pub use time::TimeSource;
