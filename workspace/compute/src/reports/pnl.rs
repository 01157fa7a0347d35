use std::collections::BTreeMap;

use common::PeriodSpec;
use model::entities::{
    company, materialized_pnl_row, transaction,
    transaction::{Direction, TransactionKind},
};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use tracing::{debug, instrument};

use super::{day_start, finish, period_end};
use crate::balance::signed_amount;
use crate::error::{ComputeError, Result};

/// Where a movement lands in the profit and loss statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PnlEffect {
    Revenue(Decimal),
    Expense(Decimal),
}

/// Transfers, advances and director loans move money without earning or
/// spending it, so they stay out of the statement. A refund reverses the
/// side it belongs to: paid out it reduces revenue, received it reduces
/// expenses.
fn classify(tx: &transaction::Model) -> Option<PnlEffect> {
    match (tx.kind, tx.direction) {
        (TransactionKind::Income, direction) => Some(PnlEffect::Revenue(direction.apply(tx.amount))),
        (TransactionKind::Outcome, direction) => Some(PnlEffect::Expense(-direction.apply(tx.amount))),
        (TransactionKind::Refund, Direction::Outflow) => Some(PnlEffect::Revenue(-tx.amount)),
        (TransactionKind::Refund, Direction::Inflow) => Some(PnlEffect::Expense(-tx.amount)),
        (TransactionKind::Transfer | TransactionKind::Advance | TransactionKind::DirectorLoan, _) => None,
    }
}

#[derive(Debug, Default)]
struct Statement {
    revenue: Decimal,
    expenses: Decimal,
    count: i64,
}

async fn replace_rows<C: ConnectionTrait>(
    db: &C,
    company: &company::Model,
    period: &PeriodSpec,
) -> Result<usize> {
    let month = period.first_day();

    materialized_pnl_row::Entity::delete_many()
        .filter(materialized_pnl_row::Column::CompanyId.eq(company.id))
        .filter(materialized_pnl_row::Column::Period.eq(month))
        .exec(db)
        .await?;

    let transactions = transaction::Entity::find()
        .filter(transaction::Column::TenantId.eq(company.tenant_id))
        .filter(transaction::Column::CompanyId.eq(company.id))
        .filter(transaction::Column::OccurredAt.gte(day_start(month)))
        .filter(transaction::Column::OccurredAt.lt(period_end(period)))
        .order_by_asc(transaction::Column::OccurredAt)
        .order_by_asc(transaction::Column::Id)
        .all(db)
        .await?;

    let mut statements: BTreeMap<String, Statement> = BTreeMap::new();
    for tx in &transactions {
        let Some(effect) = classify(tx) else {
            continue;
        };
        let amount = signed_amount(tx).map_err(|e| ComputeError::Materialization(e.to_string()))?;
        let statement = statements.entry(amount.currency_code().to_string()).or_default();
        match effect {
            PnlEffect::Revenue(value) => statement.revenue += value,
            PnlEffect::Expense(value) => statement.expenses += value,
        }
        statement.count += 1;
    }

    let rows = statements.len();
    for (currency_code, statement) in statements {
        materialized_pnl_row::Entity::insert(materialized_pnl_row::ActiveModel {
            company_id: Set(company.id),
            period: Set(month),
            currency_code: Set(currency_code),
            tenant_id: Set(company.tenant_id),
            revenue: Set(statement.revenue),
            expenses: Set(statement.expenses),
            net_profit: Set(statement.revenue - statement.expenses),
            transaction_count: Set(statement.count),
        })
        .exec_without_returning(db)
        .await?;
    }

    Ok(rows)
}

/// Rebuilds the monthly profit and loss rows of `company`, one per currency.
#[instrument(skip(db, company, period), fields(company_id = company.id, period = %period))]
pub async fn build_pnl(db: &DatabaseConnection, company: &company::Model, period: &PeriodSpec) -> Result<usize> {
    if !period.is_month() {
        return Err(ComputeError::Validation(format!(
            "profit and loss is built per month, got {}",
            period
        )));
    }

    let txn = db.begin().await?;
    let result = replace_rows(&txn, company, period).await;
    let rows = finish(txn, result).await?;
    debug!(rows, "P&L rows rebuilt");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_pnl_classification() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let cashbox = new_cashbox(&db, &tenant, &company, "EUR").await.unwrap();
        let at_jan = at(2025, 1, 10, 9);

        for (kind, direction, amount) in [
            (TransactionKind::Income, Direction::Inflow, dec!(1000)),
            (TransactionKind::Outcome, Direction::Outflow, dec!(400)),
            (TransactionKind::Refund, Direction::Outflow, dec!(100)),
            (TransactionKind::Refund, Direction::Inflow, dec!(50)),
            (TransactionKind::Transfer, Direction::Outflow, dec!(999)),
            (TransactionKind::Advance, Direction::Inflow, dec!(999)),
            (TransactionKind::DirectorLoan, Direction::Inflow, dec!(999)),
        ] {
            new_raw_transaction(&db, &cashbox, kind, direction, amount, "EUR", at_jan).await.unwrap();
        }
        // Next month is out of range
        new_transaction(&db, &cashbox, Direction::Inflow, dec!(5), at(2025, 2, 1, 0)).await.unwrap();

        let month = PeriodSpec::month(2025, 1).unwrap();
        assert_eq!(build_pnl(&db, &company, &month).await.unwrap(), 1);

        let rows = materialized_pnl_row::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].period, date(2025, 1, 1));
        assert_eq!(rows[0].revenue, dec!(900));
        assert_eq!(rows[0].expenses, dec!(350));
        assert_eq!(rows[0].net_profit, dec!(550));
        assert_eq!(rows[0].transaction_count, 4);
    }

    #[tokio::test]
    async fn test_pnl_rows_per_currency_and_idempotent() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let eur = new_cashbox(&db, &tenant, &company, "EUR").await.unwrap();
        let usd = new_cashbox(&db, &tenant, &company, "USD").await.unwrap();
        new_transaction(&db, &eur, Direction::Inflow, dec!(10), at(2025, 3, 2, 9)).await.unwrap();
        new_transaction(&db, &usd, Direction::Outflow, dec!(4), at(2025, 3, 3, 9)).await.unwrap();

        let month = PeriodSpec::month(2025, 3).unwrap();
        build_pnl(&db, &company, &month).await.unwrap();
        let first = materialized_pnl_row::Entity::find()
            .order_by_asc(materialized_pnl_row::Column::CurrencyCode)
            .all(&db)
            .await
            .unwrap();
        build_pnl(&db, &company, &month).await.unwrap();
        let second = materialized_pnl_row::Entity::find()
            .order_by_asc(materialized_pnl_row::Column::CurrencyCode)
            .all(&db)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].currency_code, "EUR");
        assert_eq!(first[1].net_profit, dec!(-4));
    }

    #[tokio::test]
    async fn test_pnl_rejects_day_period() {
        let db = setup_db().await.unwrap();
        let (_, company) = new_tenant_company(&db).await.unwrap();
        let err = build_pnl(&db, &company, &PeriodSpec::Day(date(2025, 1, 1))).await.unwrap_err();
        assert!(err.is_validation());
    }
}
