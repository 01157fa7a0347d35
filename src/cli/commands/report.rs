use anyhow::Result;
use chrono::NaiveDate;
use common::GroupBy;
use compute::{ReportQueryService, ReportRequest};
use tracing::{debug, trace};

use super::connect;
use crate::config::Settings;

pub async fn report(
    settings: &Settings,
    tenant_id: Option<i32>,
    company_id: Option<i32>,
    date_from: NaiveDate,
    date_to: NaiveDate,
    cashbox_id: Option<i32>,
    group_by: Option<GroupBy>,
) -> Result<()> {
    trace!("Entering report function");
    let db = connect(&settings.database_url).await?;

    let service = ReportQueryService::new(db, settings.reports.cache_ttl(), settings.reports.cache_capacity);
    let buckets = service
        .build_report(ReportRequest {
            tenant_id,
            company_id,
            date_from,
            date_to,
            cashbox_id,
            group_by,
        })
        .await?;
    debug!("Report has {} buckets", buckets.len());

    println!("{}", serde_json::to_string_pretty(&buckets)?);
    Ok(())
}
