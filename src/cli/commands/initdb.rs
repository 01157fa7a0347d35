use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use tracing::{debug, error, info, trace};

use super::connect;

pub async fn init_database(database_url: &str) -> Result<()> {
    trace!("Entering init_database function");
    info!("Initializing database");

    let db = connect(database_url).await?;

    info!("Running database migrations");
    match Migrator::up(&db, None).await {
        Ok(_) => {
            info!("Database migrations completed successfully");
            debug!("Ledger, materialized and job tables are in place");
        }
        Err(e) => {
            error!("Failed to run database migrations: {}", e);
            return Err(e.into());
        }
    }

    info!("Database initialization completed successfully!");
    Ok(())
}
