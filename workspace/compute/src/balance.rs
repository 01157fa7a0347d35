//! The finance balance function: a cashbox balance is its opening balance plus
//! the signed sum of its transactions up to a point in time.

use chrono::{DateTime, Utc};
use common::Money;
use model::entities::{cashbox, transaction};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::{debug, instrument};

use crate::error::{ComputeError, Result};

/// Signed value of one transaction in its own currency.
///
/// Fails when the stored amount breaks the non-negative invariant or the
/// currency code is unknown.
pub fn signed_amount(tx: &transaction::Model) -> Result<Money> {
    if tx.amount < Decimal::ZERO {
        return Err(ComputeError::BalanceComputation(format!(
            "transaction {} has a negative amount {}",
            tx.id, tx.amount
        )));
    }
    Money::new(tx.signed_amount(), &tx.currency_code).map_err(|e| {
        ComputeError::BalanceComputation(format!("transaction {}: {}", tx.id, e))
    })
}

/// Folds `transactions` onto `opening`, refusing foreign currencies.
pub fn apply_transactions<'a, I>(opening: Money, transactions: I) -> Result<Money>
where
    I: IntoIterator<Item = &'a transaction::Model>,
{
    transactions.into_iter().try_fold(opening, |balance, tx| {
        let amount = signed_amount(tx)?;
        balance.checked_add(&amount).map_err(|e| {
            ComputeError::BalanceComputation(format!(
                "transaction {} on cashbox {}: {}",
                tx.id, tx.cashbox_id, e
            ))
        })
    })
}

/// Opening balance of a cashbox as money.
pub fn opening_balance(cashbox: &cashbox::Model) -> Result<Money> {
    Money::new(cashbox.opening_balance, &cashbox.currency_code).map_err(|e| {
        ComputeError::BalanceComputation(format!("cashbox {}: {}", cashbox.id, e))
    })
}

/// Balance of `cashbox` including every transaction that occurred at or before `as_of`.
#[instrument(skip(db, cashbox), fields(cashbox_id = cashbox.id))]
pub async fn cashbox_balance<C: ConnectionTrait>(
    db: &C,
    cashbox: &cashbox::Model,
    as_of: DateTime<Utc>,
) -> Result<Money> {
    let transactions = transaction::Entity::find()
        .filter(transaction::Column::CashboxId.eq(cashbox.id))
        .filter(transaction::Column::OccurredAt.lte(as_of))
        .order_by_asc(transaction::Column::OccurredAt)
        .order_by_asc(transaction::Column::Id)
        .all(db)
        .await?;

    debug!(count = transactions.len(), "Computing cashbox balance");
    apply_transactions(opening_balance(cashbox)?, &transactions)
}

/// Same as [`cashbox_balance`] but loads the cashbox first.
pub async fn cashbox_balance_by_id<C: ConnectionTrait>(
    db: &C,
    cashbox_id: i32,
    as_of: DateTime<Utc>,
) -> Result<Money> {
    let cashbox = cashbox::Entity::find_by_id(cashbox_id)
        .one(db)
        .await?
        .ok_or_else(|| ComputeError::NotFound(format!("cashbox {}", cashbox_id)))?;
    cashbox_balance(db, &cashbox, as_of).await
}
