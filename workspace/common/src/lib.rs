//! Value objects and transport types shared by the pipeline crates and the
//! command line front end.

pub mod money;
pub mod period;

pub use money::{Money, MoneyError};
pub use period::{GroupBy, PeriodError, PeriodSpec};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One period bucket of a cash-flow report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportBucket {
    /// First day of the bucket (clamped to the requested range)
    pub period_start: NaiveDate,
    /// Last day of the bucket (clamped to the requested range)
    pub period_end: NaiveDate,
    /// ISO 4217 currency of the amounts below
    pub currency_code: String,
    /// Money received
    pub inflow: Decimal,
    /// Money paid out
    pub outflow: Decimal,
    /// `inflow - outflow`
    pub total: Decimal,
    /// Number of ledger transactions behind the bucket
    pub transaction_count: i64,
}

/// One month of a profit and loss report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PnlLine {
    pub period: NaiveDate,
    pub currency_code: String,
    pub revenue: Decimal,
    pub expenses: Decimal,
    pub net_profit: Decimal,
    pub transaction_count: i64,
}

/// Outstanding debt of one contract at a snapshot date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebtLine {
    pub contract_id: i32,
    pub counterparty: String,
    pub snapshot_date: NaiveDate,
    pub currency_code: String,
    pub obligation: Decimal,
    pub paid: Decimal,
    pub debt: Decimal,
}
