use common::{MoneyError, PeriodError};
use thiserror::Error;

/// Error types for the compute module
#[derive(Error, Debug)]
pub enum ComputeError {
    /// Error from the database operations
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Invalid caller input (tenant, company, cashbox, dates). Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Error from money arithmetic
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    /// Error from period parsing
    #[error("Period error: {0}")]
    Period(#[from] PeriodError),

    /// Error from balance computation
    #[error("Balance computation error: {0}")]
    BalanceComputation(String),

    /// A report build could not produce its rows; prior rows are untouched
    #[error("Materialization error: {0}")]
    Materialization(String),

    /// Error from the overlap guard
    #[error("Lock error: {0}")]
    Lock(String),

    /// Runtime error for unexpected situations
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl ComputeError {
    /// Validation failures are surfaced to the caller and must not be retried.
    pub fn is_validation(&self) -> bool {
        matches!(self, ComputeError::Validation(_) | ComputeError::Period(_))
    }
}

/// Type alias for Result with ComputeError
pub type Result<T> = std::result::Result<T, ComputeError>;
