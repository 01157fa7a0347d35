pub mod build;
pub mod initdb;
pub mod reconcile;
pub mod report;
pub mod run_scheduler;
pub mod snapshot;

pub use build::build;
pub use initdb::init_database;
pub use reconcile::reconcile_cashbox;
pub use report::report;
pub use run_scheduler::run_scheduler;
pub use snapshot::snapshot_balances;

use anyhow::Result;
use sea_orm::{Database, DatabaseConnection};
use tracing::{debug, error, info, trace};

/// Opens the database, logging the outcome.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection> {
    trace!("Attempting to connect to database");
    debug!("Database URL: {}", database_url);
    match Database::connect(database_url).await {
        Ok(connection) => {
            info!("Successfully connected to database");
            Ok(connection)
        }
        Err(e) => {
            error!("Failed to connect to database '{}': {}", database_url, e);
            Err(e.into())
        }
    }
}
