use std::collections::BTreeMap;

use chrono::NaiveDate;
use common::PeriodSpec;
use model::entities::{company, materialized_cashflow_row, transaction, transaction::Direction};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use tracing::{debug, instrument};

use super::{day_start, finish, period_end};
use crate::balance::signed_amount;
use crate::error::{ComputeError, Result};

#[derive(Debug)]
struct DayTotals {
    currency_code: String,
    inflow: Decimal,
    outflow: Decimal,
    count: i64,
}

async fn replace_rows<C: ConnectionTrait>(
    db: &C,
    company: &company::Model,
    period: &PeriodSpec,
) -> Result<usize> {
    let from = period.first_day();
    let to = period.last_day();

    materialized_cashflow_row::Entity::delete_many()
        .filter(materialized_cashflow_row::Column::CompanyId.eq(company.id))
        .filter(materialized_cashflow_row::Column::Date.between(from, to))
        .exec(db)
        .await?;

    let transactions = transaction::Entity::find()
        .filter(transaction::Column::TenantId.eq(company.tenant_id))
        .filter(transaction::Column::CompanyId.eq(company.id))
        .filter(transaction::Column::OccurredAt.gte(day_start(from)))
        .filter(transaction::Column::OccurredAt.lt(period_end(period)))
        .order_by_asc(transaction::Column::OccurredAt)
        .order_by_asc(transaction::Column::Id)
        .all(db)
        .await?;

    let mut days: BTreeMap<(i32, NaiveDate), DayTotals> = BTreeMap::new();
    for tx in &transactions {
        let amount = signed_amount(tx).map_err(|e| ComputeError::Materialization(e.to_string()))?;
        let totals = days
            .entry((tx.cashbox_id, tx.occurred_at.date_naive()))
            .or_insert_with(|| DayTotals {
                currency_code: amount.currency_code().to_string(),
                inflow: Decimal::ZERO,
                outflow: Decimal::ZERO,
                count: 0,
            });
        if totals.currency_code != amount.currency_code() {
            return Err(ComputeError::Materialization(format!(
                "cashbox {} mixes {} and {} on {}",
                tx.cashbox_id,
                totals.currency_code,
                amount.currency_code(),
                tx.occurred_at.date_naive()
            )));
        }
        match tx.direction {
            Direction::Inflow => totals.inflow += tx.amount,
            Direction::Outflow => totals.outflow += tx.amount,
        }
        totals.count += 1;
    }

    let rows = days.len();
    for ((cashbox_id, date), totals) in days {
        materialized_cashflow_row::Entity::insert(materialized_cashflow_row::ActiveModel {
            company_id: Set(company.id),
            cashbox_id: Set(cashbox_id),
            date: Set(date),
            tenant_id: Set(company.tenant_id),
            inflow: Set(totals.inflow),
            outflow: Set(totals.outflow),
            total: Set(totals.inflow - totals.outflow),
            transaction_count: Set(totals.count),
            currency_code: Set(totals.currency_code),
        })
        .exec_without_returning(db)
        .await?;
    }

    Ok(rows)
}

/// Rebuilds the daily cash-flow rows of `company` for a day or a whole month.
///
/// One row per cashbox and day with activity. All rows of the period are
/// replaced atomically.
#[instrument(skip(db, company, period), fields(company_id = company.id, period = %period))]
pub async fn build_cashflow(
    db: &DatabaseConnection,
    company: &company::Model,
    period: &PeriodSpec,
) -> Result<usize> {
    let txn = db.begin().await?;
    let result = replace_rows(&txn, company, period).await;
    let rows = finish(txn, result).await?;
    debug!(rows, "Cash-flow rows rebuilt");
    Ok(rows)
}
