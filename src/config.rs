use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Runtime settings.
///
/// Sources, later ones winning: built-in defaults, an optional
/// `backoffice.toml` in the working directory, then `BACKOFFICE_*`
/// environment variables (`__` separates sections, e.g.
/// `BACKOFFICE_SCHEDULER__TICK_SECONDS=10`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub database_url: String,
    /// Companies the scheduler builds reports for
    pub active_company_ids: Vec<i32>,
    pub scheduler: SchedulerSettings,
    pub events: EventSettings,
    pub reports: ReportSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SchedulerSettings {
    pub tick_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EventSettings {
    /// Attempts per listener before the failure is logged and dropped
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReportSettings {
    pub cache_ttl_seconds: u64,
    pub cache_capacity: u64,
}

impl SchedulerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(1))
    }
}

impl ReportSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("database_url", "sqlite://backoffice.sqlite?mode=rwc")?
        .set_default("active_company_ids", Vec::<i64>::new())?
        .set_default("scheduler.tick_seconds", 30_i64)?
        .set_default("events.max_attempts", 3_i64)?
        .set_default("reports.cache_ttl_seconds", 300_i64)?
        .set_default("reports.cache_capacity", 1000_i64)?)
}

fn environment() -> Environment {
    Environment::with_prefix("BACKOFFICE")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("active_company_ids")
        .try_parsing(true)
}

impl Settings {
    /// Loads `.env`, then every configured source.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let builder = defaults()?
            .add_source(File::with_name("backoffice").required(false))
            .add_source(environment());
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_builder(defaults().unwrap()).unwrap();
        assert!(settings.active_company_ids.is_empty());
        assert_eq!(settings.scheduler.tick_seconds, 30);
        assert_eq!(settings.events.max_attempts, 3);
        assert_eq!(settings.reports.cache_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
database_url = "sqlite::memory:"
active_company_ids = [1, 7]

[scheduler]
tick_seconds = 5
"#
        )
        .unwrap();

        let builder = defaults().unwrap().add_source(File::from(file.path()));
        let settings = Settings::from_builder(builder).unwrap();
        assert_eq!(settings.database_url, "sqlite::memory:");
        assert_eq!(settings.active_company_ids, vec![1, 7]);
        assert_eq!(settings.scheduler.tick_interval(), Duration::from_secs(5));
        assert_eq!(settings.reports.cache_capacity, 1000);
    }
}
