//! Recalculation listeners.
//!
//! Each function recomputes exactly one derived aggregate from the ledger and
//! writes it back. They are pure reactions to domain events: nothing here
//! publishes further events.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use common::Money;
use model::entities::{cashbox, cashbox_history, contract, contract::ContractStatus, transaction};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::{debug, instrument, warn};

use crate::balance::{apply_transactions, cashbox_balance, opening_balance, signed_amount};
use crate::error::{ComputeError, Result};

async fn find_cashbox<C: ConnectionTrait>(
    db: &C,
    tenant_id: i32,
    cashbox_id: i32,
) -> Result<Option<cashbox::Model>> {
    Ok(cashbox::Entity::find_by_id(cashbox_id)
        .filter(cashbox::Column::TenantId.eq(tenant_id))
        .one(db)
        .await?)
}

async fn find_contract<C: ConnectionTrait>(
    db: &C,
    tenant_id: i32,
    contract_id: i32,
) -> Result<Option<contract::Model>> {
    Ok(contract::Entity::find_by_id(contract_id)
        .filter(contract::Column::TenantId.eq(tenant_id))
        .one(db)
        .await?)
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Rebuilds the per-day history of a cashbox from `from` onwards.
///
/// With `from = None` the whole history is rebuilt. Returns the number of
/// history rows written. A cashbox that no longer exists is a no-op.
#[instrument(skip(db))]
pub async fn recalc_cashbox_history(
    db: &DatabaseConnection,
    tenant_id: i32,
    cashbox_id: i32,
    from: Option<NaiveDate>,
) -> Result<usize> {
    let txn = db.begin().await?;

    let Some(cashbox) = find_cashbox(&txn, tenant_id, cashbox_id).await? else {
        debug!("Cashbox gone, nothing to rebuild");
        txn.rollback().await?;
        return Ok(0);
    };

    let mut delete = cashbox_history::Entity::delete_many()
        .filter(cashbox_history::Column::CashboxId.eq(cashbox.id));
    if let Some(from) = from {
        delete = delete.filter(cashbox_history::Column::Date.gte(from));
    }
    delete.exec(&txn).await?;

    // Balance carried into the first rebuilt day
    let mut running = match from {
        Some(from) => {
            let earlier = transaction::Entity::find()
                .filter(transaction::Column::CashboxId.eq(cashbox.id))
                .filter(transaction::Column::OccurredAt.lt(start_of_day(from)))
                .all(&txn)
                .await?;
            apply_transactions(opening_balance(&cashbox)?, &earlier)?
        }
        None => opening_balance(&cashbox)?,
    };

    let mut query = transaction::Entity::find()
        .filter(transaction::Column::CashboxId.eq(cashbox.id))
        .order_by_asc(transaction::Column::OccurredAt)
        .order_by_asc(transaction::Column::Id);
    if let Some(from) = from {
        query = query.filter(transaction::Column::OccurredAt.gte(start_of_day(from)));
    }
    let transactions = query.all(&txn).await?;

    let mut days: BTreeMap<NaiveDate, (Decimal, Decimal, Vec<Money>)> = BTreeMap::new();
    for tx in &transactions {
        let amount = signed_amount(tx)?;
        let entry = days
            .entry(tx.occurred_at.date_naive())
            .or_insert((Decimal::ZERO, Decimal::ZERO, Vec::new()));
        match tx.direction {
            transaction::Direction::Inflow => entry.0 += tx.amount,
            transaction::Direction::Outflow => entry.1 += tx.amount,
        }
        entry.2.push(amount);
    }

    let mut written = 0;
    for (date, (inflow, outflow, amounts)) in days {
        for amount in &amounts {
            running = running.checked_add(amount).map_err(|e| {
                ComputeError::BalanceComputation(format!("cashbox {}: {}", cashbox.id, e))
            })?;
        }
        cashbox_history::ActiveModel {
            cashbox_id: Set(cashbox.id),
            date: Set(date),
            tenant_id: Set(cashbox.tenant_id),
            company_id: Set(cashbox.company_id),
            inflow: Set(inflow),
            outflow: Set(outflow),
            closing_balance: Set(running.amount()),
            currency_code: Set(running.currency_code().to_string()),
        }
        .insert(&txn)
        .await?;
        written += 1;
    }

    txn.commit().await?;
    debug!(rows = written, "Cashbox history rebuilt");
    Ok(written)
}

/// Recomputes the cached balance of a cashbox as of `now`.
///
/// Returns the new balance, or `None` when the cashbox no longer exists.
#[instrument(skip(db))]
pub async fn recalc_cashbox_balance(
    db: &DatabaseConnection,
    tenant_id: i32,
    cashbox_id: i32,
    now: DateTime<Utc>,
) -> Result<Option<Money>> {
    let Some(cashbox) = find_cashbox(db, tenant_id, cashbox_id).await? else {
        debug!("Cashbox gone, nothing to recalculate");
        return Ok(None);
    };

    let balance = cashbox_balance(db, &cashbox, now).await?;

    let mut active: cashbox::ActiveModel = cashbox.into();
    active.cached_balance = Set(balance.amount());
    active.balance_updated_at = Set(Some(now));
    active.update(db).await?;

    debug!(balance = %balance, "Cashbox balance recalculated");
    Ok(Some(balance))
}

/// Recomputes how much has been paid against a contract and what is left.
///
/// Payments in another currency than the contract are rejected.
#[instrument(skip(db))]
pub async fn recalc_contract_balance(
    db: &DatabaseConnection,
    tenant_id: i32,
    contract_id: i32,
) -> Result<Option<contract::Model>> {
    let Some(contract) = find_contract(db, tenant_id, contract_id).await? else {
        debug!("Contract gone, nothing to recalculate");
        return Ok(None);
    };

    let payments = transaction::Entity::find()
        .filter(transaction::Column::ContractId.eq(contract.id))
        .filter(transaction::Column::TenantId.eq(tenant_id))
        .all(db)
        .await?;

    let zero = Money::zero(&contract.currency_code).map_err(|e| {
        ComputeError::BalanceComputation(format!("contract {}: {}", contract.id, e))
    })?;
    let paid = apply_transactions(zero, &payments)?;

    let mut active: contract::ActiveModel = contract.clone().into();
    active.paid_amount = Set(paid.amount());
    active.balance = Set(contract.total_amount - paid.amount());
    let updated = active.update(db).await?;

    debug!(paid = %paid, "Contract balance recalculated");
    Ok(Some(updated))
}

/// Derives the contract status from its stored balance.
#[instrument(skip(db))]
pub async fn update_contract_status(
    db: &DatabaseConnection,
    tenant_id: i32,
    contract_id: i32,
) -> Result<Option<ContractStatus>> {
    let Some(contract) = find_contract(db, tenant_id, contract_id).await? else {
        return Ok(None);
    };

    if contract.balance != contract.total_amount - contract.paid_amount {
        warn!(
            contract_id,
            "Contract balance is out of sync with paid amount; deriving status from paid amount"
        );
    }

    let status = ContractStatus::derive(contract.total_amount, contract.paid_amount);
    if status != contract.status {
        let mut active: contract::ActiveModel = contract.into();
        active.status = Set(status);
        active.update(db).await?;
        debug!(?status, "Contract status changed");
    }

    Ok(Some(status))
}
