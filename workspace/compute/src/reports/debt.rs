use chrono::Duration;
use common::{Money, PeriodSpec};
use model::entities::{company, contract, debt_snapshot_row, transaction};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use tracing::{debug, instrument};

use super::{day_start, finish};
use crate::balance::apply_transactions;
use crate::error::{ComputeError, Result};

async fn replace_rows<C: ConnectionTrait>(
    db: &C,
    company: &company::Model,
    period: &PeriodSpec,
) -> Result<usize> {
    let snapshot_date = period.first_day();
    let cutoff = day_start(snapshot_date) + Duration::days(1);

    debt_snapshot_row::Entity::delete_many()
        .filter(debt_snapshot_row::Column::CompanyId.eq(company.id))
        .filter(debt_snapshot_row::Column::SnapshotDate.eq(snapshot_date))
        .exec(db)
        .await?;

    let contracts = contract::Entity::find()
        .filter(contract::Column::TenantId.eq(company.tenant_id))
        .filter(contract::Column::CompanyId.eq(company.id))
        .filter(contract::Column::SignedOn.lte(snapshot_date))
        .order_by_asc(contract::Column::Id)
        .all(db)
        .await?;

    let mut rows = 0;
    for contract in contracts {
        let payments = transaction::Entity::find()
            .filter(transaction::Column::TenantId.eq(company.tenant_id))
            .filter(transaction::Column::ContractId.eq(contract.id))
            .filter(transaction::Column::OccurredAt.lt(cutoff))
            .order_by_asc(transaction::Column::Id)
            .all(db)
            .await?;

        let paid = Money::zero(&contract.currency_code)
            .map_err(ComputeError::from)
            .and_then(|zero| apply_transactions(zero, &payments))
            .map_err(|e| ComputeError::Materialization(format!("contract {}: {}", contract.id, e)))?;

        let debt = contract.total_amount - paid.amount();
        if debt.is_zero() {
            continue;
        }

        debt_snapshot_row::Entity::insert(debt_snapshot_row::ActiveModel {
            company_id: Set(company.id),
            snapshot_date: Set(snapshot_date),
            contract_id: Set(contract.id),
            tenant_id: Set(company.tenant_id),
            counterparty: Set(contract.counterparty),
            obligation: Set(contract.total_amount),
            paid: Set(paid.amount()),
            debt: Set(debt),
            currency_code: Set(contract.currency_code),
        })
        .exec_without_returning(db)
        .await?;
        rows += 1;
    }

    Ok(rows)
}

/// Rebuilds the debt snapshot of `company` at the end of one day.
///
/// Contracts signed after the day are ignored; fully settled contracts get
/// no row.
#[instrument(skip(db, company, period), fields(company_id = company.id, period = %period))]
pub async fn build_debt_snapshot(
    db: &DatabaseConnection,
    company: &company::Model,
    period: &PeriodSpec,
) -> Result<usize> {
    if !period.is_day() {
        return Err(ComputeError::Validation(format!(
            "debt snapshots are taken per day, got {}",
            period
        )));
    }

    let txn = db.begin().await?;
    let result = replace_rows(&txn, company, period).await;
    let rows = finish(txn, result).await?;
    debug!(rows, "Debt snapshot rebuilt");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_debt_snapshot_as_of_day() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let cashbox = new_cashbox(&db, &tenant, &company, "EUR").await.unwrap();
        let open = new_contract(&db, &company, dec!(1000), date(2025, 1, 1)).await.unwrap();
        let settled = new_contract(&db, &company, dec!(200), date(2025, 1, 1)).await.unwrap();
        new_contract(&db, &company, dec!(500), date(2025, 2, 1)).await.unwrap();

        new_payment(&db, &cashbox, &open, dec!(300), at(2025, 1, 10, 9)).await.unwrap();
        new_payment(&db, &cashbox, &open, dec!(100), at(2025, 1, 16, 9)).await.unwrap();
        new_payment(&db, &cashbox, &settled, dec!(200), at(2025, 1, 12, 9)).await.unwrap();

        let day = PeriodSpec::Day(date(2025, 1, 15));
        assert_eq!(build_debt_snapshot(&db, &company, &day).await.unwrap(), 1);

        let rows = debt_snapshot_row::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].contract_id, open.id);
        assert_eq!(rows[0].paid, dec!(300));
        assert_eq!(rows[0].debt, dec!(700));

        // Same inputs, same rows
        build_debt_snapshot(&db, &company, &day).await.unwrap();
        assert_eq!(debt_snapshot_row::Entity::find().all(&db).await.unwrap(), rows);
    }

    #[tokio::test]
    async fn test_debt_snapshot_rejects_month() {
        let db = setup_db().await.unwrap();
        let (_, company) = new_tenant_company(&db).await.unwrap();
        let err = build_debt_snapshot(&db, &company, &PeriodSpec::month(2025, 1).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}
