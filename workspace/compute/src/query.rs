//! Read side of the pipeline.
//!
//! Every answer comes from the materialized tables; nothing here touches the
//! raw ledger. Responses are cached until the next successful build.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use common::{DebtLine, GroupBy, PnlLine, ReportBucket};
use model::entities::{cashbox, company, debt_snapshot_row, materialized_cashflow_row, materialized_pnl_row};
use moka::future::Cache;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use tracing::{debug, instrument};

use crate::error::{ComputeError, Result};

/// Parameters of a cash-flow report.
///
/// Tenant and company are optional so that a caller forgetting them gets a
/// validation error instead of a silently unscoped query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportRequest {
    pub tenant_id: Option<i32>,
    pub company_id: Option<i32>,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub cashbox_id: Option<i32>,
    pub group_by: Option<GroupBy>,
}

/// Cached responses
#[derive(Debug, Clone)]
pub enum CachedReport {
    Cashflow(Vec<ReportBucket>),
    Pnl(Vec<PnlLine>),
    Debt(Vec<DebtLine>),
}

#[derive(Clone)]
pub struct ReportQueryService {
    db: DatabaseConnection,
    cache: Cache<String, CachedReport>,
}

fn positive(value: Option<i32>, what: &str) -> Result<i32> {
    match value {
        None => Err(ComputeError::Validation(format!("{} is required", what))),
        Some(id) if id <= 0 => Err(ComputeError::Validation(format!(
            "{} must be positive, got {}",
            what, id
        ))),
        Some(id) => Ok(id),
    }
}

fn check_range(from: NaiveDate, to: NaiveDate) -> Result<()> {
    if from > to {
        return Err(ComputeError::Validation(format!(
            "date_from {} is after date_to {}",
            from, to
        )));
    }
    Ok(())
}

impl ReportQueryService {
    pub fn new(db: DatabaseConnection, ttl: Duration, capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { db, cache }
    }

    /// Drops every cached response.
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }

    /// The company, provided it belongs to the tenant.
    async fn scoped_company(&self, tenant_id: Option<i32>, company_id: Option<i32>) -> Result<company::Model> {
        let tenant_id = positive(tenant_id, "tenant_id")?;
        let company_id = positive(company_id, "company_id")?;
        company::Entity::find_by_id(company_id)
            .filter(company::Column::TenantId.eq(tenant_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ComputeError::Validation(format!(
                    "company {} does not belong to tenant {}",
                    company_id, tenant_id
                ))
            })
    }

    /// Cash-flow buckets of one company, optionally one cashbox.
    ///
    /// Without `group_by` there is one bucket per currency spanning the whole
    /// range. Buckets are clamped to the range and ordered by start date,
    /// then currency.
    #[instrument(skip(self))]
    pub async fn build_report(&self, request: ReportRequest) -> Result<Vec<ReportBucket>> {
        let company = self.scoped_company(request.tenant_id, request.company_id).await?;
        check_range(request.date_from, request.date_to)?;
        if let Some(cashbox_id) = request.cashbox_id {
            let cashbox_id = positive(Some(cashbox_id), "cashbox_id")?;
            cashbox::Entity::find_by_id(cashbox_id)
                .filter(cashbox::Column::TenantId.eq(company.tenant_id))
                .filter(cashbox::Column::CompanyId.eq(company.id))
                .one(&self.db)
                .await?
                .ok_or_else(|| {
                    ComputeError::Validation(format!(
                        "cashbox {} does not belong to company {}",
                        cashbox_id, company.id
                    ))
                })?;
        }

        let cache_key = format!("cashflow_{:?}", request);
        if let Some(CachedReport::Cashflow(buckets)) = self.cache.get(&cache_key).await {
            debug!("Cash-flow report served from cache");
            return Ok(buckets);
        }

        let mut query = materialized_cashflow_row::Entity::find()
            .filter(materialized_cashflow_row::Column::TenantId.eq(company.tenant_id))
            .filter(materialized_cashflow_row::Column::CompanyId.eq(company.id))
            .filter(materialized_cashflow_row::Column::Date.between(request.date_from, request.date_to));
        if let Some(cashbox_id) = request.cashbox_id {
            query = query.filter(materialized_cashflow_row::Column::CashboxId.eq(cashbox_id));
        }
        let rows = query
            .order_by_asc(materialized_cashflow_row::Column::Date)
            .order_by_asc(materialized_cashflow_row::Column::CashboxId)
            .all(&self.db)
            .await?;

        let mut buckets: BTreeMap<(NaiveDate, String), ReportBucket> = BTreeMap::new();
        for row in rows {
            let (start, end) = match request.group_by {
                Some(group_by) => (
                    group_by.bucket_start(row.date).max(request.date_from),
                    group_by.bucket_end(row.date).min(request.date_to),
                ),
                None => (request.date_from, request.date_to),
            };
            let bucket = buckets
                .entry((start, row.currency_code.clone()))
                .or_insert_with(|| ReportBucket {
                    period_start: start,
                    period_end: end,
                    currency_code: row.currency_code.clone(),
                    inflow: Decimal::ZERO,
                    outflow: Decimal::ZERO,
                    total: Decimal::ZERO,
                    transaction_count: 0,
                });
            bucket.inflow += row.inflow;
            bucket.outflow += row.outflow;
            bucket.total += row.total;
            bucket.transaction_count += row.transaction_count;
        }

        let buckets: Vec<ReportBucket> = buckets.into_values().collect();
        self.cache
            .insert(cache_key, CachedReport::Cashflow(buckets.clone()))
            .await;
        Ok(buckets)
    }

    /// Monthly P&L lines whose month overlaps `from..=to`.
    #[instrument(skip(self))]
    pub async fn pnl_report(
        &self,
        tenant_id: Option<i32>,
        company_id: Option<i32>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PnlLine>> {
        let company = self.scoped_company(tenant_id, company_id).await?;
        check_range(from, to)?;

        let cache_key = format!("pnl_{}_{}_{}", company.id, from, to);
        if let Some(CachedReport::Pnl(lines)) = self.cache.get(&cache_key).await {
            return Ok(lines);
        }

        let lines: Vec<PnlLine> = materialized_pnl_row::Entity::find()
            .filter(materialized_pnl_row::Column::TenantId.eq(company.tenant_id))
            .filter(materialized_pnl_row::Column::CompanyId.eq(company.id))
            .filter(materialized_pnl_row::Column::Period.between(GroupBy::Month.bucket_start(from), to))
            .order_by_asc(materialized_pnl_row::Column::Period)
            .order_by_asc(materialized_pnl_row::Column::CurrencyCode)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|row| PnlLine {
                period: row.period,
                currency_code: row.currency_code,
                revenue: row.revenue,
                expenses: row.expenses,
                net_profit: row.net_profit,
                transaction_count: row.transaction_count,
            })
            .collect();

        self.cache.insert(cache_key, CachedReport::Pnl(lines.clone())).await;
        Ok(lines)
    }

    /// Debt snapshot lines of one day, ordered by contract.
    #[instrument(skip(self))]
    pub async fn debt_report(
        &self,
        tenant_id: Option<i32>,
        company_id: Option<i32>,
        snapshot_date: NaiveDate,
    ) -> Result<Vec<DebtLine>> {
        let company = self.scoped_company(tenant_id, company_id).await?;

        let cache_key = format!("debt_{}_{}", company.id, snapshot_date);
        if let Some(CachedReport::Debt(lines)) = self.cache.get(&cache_key).await {
            return Ok(lines);
        }

        let lines: Vec<DebtLine> = debt_snapshot_row::Entity::find()
            .filter(debt_snapshot_row::Column::TenantId.eq(company.tenant_id))
            .filter(debt_snapshot_row::Column::CompanyId.eq(company.id))
            .filter(debt_snapshot_row::Column::SnapshotDate.eq(snapshot_date))
            .order_by_asc(debt_snapshot_row::Column::ContractId)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|row| DebtLine {
                contract_id: row.contract_id,
                counterparty: row.counterparty,
                snapshot_date: row.snapshot_date,
                currency_code: row.currency_code,
                obligation: row.obligation,
                paid: row.paid,
                debt: row.debt,
            })
            .collect();

        self.cache.insert(cache_key, CachedReport::Debt(lines.clone())).await;
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::{build_cashflow, build_pnl, BuildJob, ReportBuilder};
    use crate::testing::*;
    use crate::time::TimeSource;
    use common::PeriodSpec;
    use model::entities::transaction::Direction;
    use rust_decimal_macros::dec;

    fn service(db: &DatabaseConnection) -> ReportQueryService {
        ReportQueryService::new(db.clone(), Duration::from_secs(60), 100)
    }

    fn request(tenant_id: i32, company_id: i32, from: NaiveDate, to: NaiveDate) -> ReportRequest {
        ReportRequest {
            tenant_id: Some(tenant_id),
            company_id: Some(company_id),
            date_from: from,
            date_to: to,
            cashbox_id: None,
            group_by: None,
        }
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let (other_tenant, other_company) = new_tenant_company(&db).await.unwrap();
        let foreign_cashbox = new_cashbox(&db, &other_tenant, &other_company, "EUR").await.unwrap();
        let service = service(&db);
        let base = request(tenant.id, company.id, date(2025, 1, 1), date(2025, 1, 31));

        let backwards = ReportRequest {
            date_from: date(2025, 2, 1),
            ..base.clone()
        };
        assert!(service.build_report(backwards).await.unwrap_err().is_validation());

        let no_company = ReportRequest {
            company_id: None,
            ..base.clone()
        };
        assert!(service.build_report(no_company).await.unwrap_err().is_validation());

        let no_tenant = ReportRequest {
            tenant_id: None,
            ..base.clone()
        };
        assert!(service.build_report(no_tenant).await.unwrap_err().is_validation());

        let cross_tenant = ReportRequest {
            company_id: Some(other_company.id),
            ..base.clone()
        };
        assert!(service.build_report(cross_tenant).await.unwrap_err().is_validation());

        let foreign = ReportRequest {
            cashbox_id: Some(foreign_cashbox.id),
            ..base
        };
        assert!(service.build_report(foreign).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_empty_range_is_empty() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let buckets = service(&db)
            .build_report(request(tenant.id, company.id, date(2025, 1, 1), date(2025, 1, 31)))
            .await
            .unwrap();
        assert!(buckets.is_empty());
    }

    #[tokio::test]
    async fn test_grouping_and_ordering() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let eur = new_cashbox(&db, &tenant, &company, "EUR").await.unwrap();
        let usd = new_cashbox(&db, &tenant, &company, "USD").await.unwrap();
        // 2025-01-06 is a Monday
        new_transaction(&db, &eur, Direction::Inflow, dec!(100), at(2025, 1, 6, 9)).await.unwrap();
        new_transaction(&db, &eur, Direction::Outflow, dec!(30), at(2025, 1, 8, 9)).await.unwrap();
        new_transaction(&db, &usd, Direction::Inflow, dec!(7), at(2025, 1, 7, 9)).await.unwrap();
        new_transaction(&db, &eur, Direction::Inflow, dec!(1), at(2025, 1, 14, 9)).await.unwrap();
        build_cashflow(&db, &company, &PeriodSpec::month(2025, 1).unwrap()).await.unwrap();
        let service = service(&db);

        let weekly = service
            .build_report(ReportRequest {
                group_by: Some(GroupBy::Week),
                ..request(tenant.id, company.id, date(2025, 1, 1), date(2025, 1, 31))
            })
            .await
            .unwrap();
        let keys: Vec<_> = weekly
            .iter()
            .map(|b| (b.period_start, b.currency_code.as_str(), b.total))
            .collect();
        assert_eq!(
            keys,
            vec![
                (date(2025, 1, 6), "EUR", dec!(70)),
                (date(2025, 1, 6), "USD", dec!(7)),
                (date(2025, 1, 13), "EUR", dec!(1)),
            ]
        );
        assert_eq!(weekly[0].period_end, date(2025, 1, 12));
        assert_eq!(weekly[0].transaction_count, 2);

        // The first week is clamped to the range
        let clamped = service
            .build_report(ReportRequest {
                group_by: Some(GroupBy::Week),
                ..request(tenant.id, company.id, date(2025, 1, 7), date(2025, 1, 10))
            })
            .await
            .unwrap();
        assert_eq!(clamped[0].period_start, date(2025, 1, 7));
        assert_eq!(clamped[0].period_end, date(2025, 1, 10));

        let ungrouped = service
            .build_report(ReportRequest {
                cashbox_id: Some(eur.id),
                ..request(tenant.id, company.id, date(2025, 1, 1), date(2025, 1, 31))
            })
            .await
            .unwrap();
        assert_eq!(ungrouped.len(), 1);
        assert_eq!(ungrouped[0].total, dec!(71));
        assert_eq!(ungrouped[0].period_start, date(2025, 1, 1));
    }

    #[tokio::test]
    async fn test_reads_only_materialized_rows() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let cashbox = new_cashbox(&db, &tenant, &company, "EUR").await.unwrap();
        let service = service(&db);
        let builder = ReportBuilder::new(db.clone(), TimeSource::fixed(at(2025, 1, 5, 13)))
            .with_query_service(service.clone());
        let req = request(tenant.id, company.id, date(2025, 1, 5), date(2025, 1, 5));

        new_transaction(&db, &cashbox, Direction::Inflow, dec!(1000), at(2025, 1, 5, 9)).await.unwrap();
        assert!(service.build_report(req.clone()).await.unwrap().is_empty());

        builder
            .run(BuildJob::CashflowDay, company.id, &PeriodSpec::Day(date(2025, 1, 5)))
            .await
            .unwrap();
        let buckets = service.build_report(req).await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].total, dec!(1000));
    }

    #[tokio::test]
    async fn test_pnl_and_debt_reports() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let cashbox = new_cashbox(&db, &tenant, &company, "EUR").await.unwrap();
        let contract = new_contract(&db, &company, dec!(500), date(2025, 1, 1)).await.unwrap();
        new_payment(&db, &cashbox, &contract, dec!(200), at(2025, 1, 10, 9)).await.unwrap();

        build_pnl(&db, &company, &PeriodSpec::month(2025, 1).unwrap()).await.unwrap();
        crate::reports::build_debt_snapshot(&db, &company, &PeriodSpec::Day(date(2025, 1, 31)))
            .await
            .unwrap();
        let service = service(&db);

        let pnl = service
            .pnl_report(Some(tenant.id), Some(company.id), date(2025, 1, 15), date(2025, 3, 31))
            .await
            .unwrap();
        assert_eq!(pnl.len(), 1);
        assert_eq!(pnl[0].revenue, dec!(200));

        let debt = service
            .debt_report(Some(tenant.id), Some(company.id), date(2025, 1, 31))
            .await
            .unwrap();
        assert_eq!(debt.len(), 1);
        assert_eq!(debt[0].debt, dec!(300));

        assert!(service.debt_report(None, Some(company.id), date(2025, 1, 31)).await.is_err());
    }
}
