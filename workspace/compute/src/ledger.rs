//! Write path for ledger mutations.
//!
//! Every mutation is committed before its event is published, so listener
//! failures can never undo it.

use chrono::{DateTime, Utc};
use common::Money;
use model::entities::{
    cashbox, contract, transaction,
    transaction::{Direction, TransactionKind},
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set,
};
use tracing::{info, instrument};

use crate::error::{ComputeError, Result};
use crate::events::{CashboxContext, DomainEvent, EventSink, PaymentContext, TransactionContext};

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub tenant_id: i32,
    pub company_id: i32,
    pub cashbox_id: i32,
    pub counterparty: Option<String>,
    pub kind: TransactionKind,
    pub direction: Direction,
    pub amount: Decimal,
    pub currency_code: String,
    pub occurred_at: DateTime<Utc>,
    pub contract_id: Option<i32>,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub cashbox_id: Option<i32>,
    pub counterparty: Option<Option<String>>,
    pub kind: Option<TransactionKind>,
    pub direction: Option<Direction>,
    pub amount: Option<Decimal>,
    pub occurred_at: Option<DateTime<Utc>>,
}

pub struct LedgerService<S: EventSink> {
    db: DatabaseConnection,
    events: S,
}

fn validate_amount(amount: Decimal) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(ComputeError::Validation(format!(
            "amount must not be negative, got {}",
            amount
        )));
    }
    Ok(())
}

impl<S: EventSink> LedgerService<S> {
    pub fn new(db: DatabaseConnection, events: S) -> Self {
        Self { db, events }
    }

    async fn scoped_cashbox(&self, tenant_id: i32, company_id: i32, cashbox_id: i32) -> Result<cashbox::Model> {
        cashbox::Entity::find_by_id(cashbox_id)
            .filter(cashbox::Column::TenantId.eq(tenant_id))
            .filter(cashbox::Column::CompanyId.eq(company_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ComputeError::Validation(format!(
                    "cashbox {} does not belong to company {} of tenant {}",
                    cashbox_id, company_id, tenant_id
                ))
            })
    }

    async fn scoped_contract(&self, tenant_id: i32, company_id: i32, contract_id: i32) -> Result<contract::Model> {
        contract::Entity::find_by_id(contract_id)
            .filter(contract::Column::TenantId.eq(tenant_id))
            .filter(contract::Column::CompanyId.eq(company_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ComputeError::Validation(format!(
                    "contract {} does not belong to company {} of tenant {}",
                    contract_id, company_id, tenant_id
                ))
            })
    }

    async fn scoped_transaction(&self, tenant_id: i32, transaction_id: i32) -> Result<transaction::Model> {
        transaction::Entity::find_by_id(transaction_id)
            .filter(transaction::Column::TenantId.eq(tenant_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| ComputeError::NotFound(format!("transaction {}", transaction_id)))
    }

    #[instrument(skip(self, new), fields(tenant_id = new.tenant_id, cashbox_id = new.cashbox_id))]
    pub async fn create_transaction(&self, new: NewTransaction) -> Result<transaction::Model> {
        validate_amount(new.amount)?;
        let money = Money::new(new.amount, &new.currency_code)
            .map_err(|e| ComputeError::Validation(e.to_string()))?;

        let cashbox = self.scoped_cashbox(new.tenant_id, new.company_id, new.cashbox_id).await?;
        if cashbox.currency_code != money.currency_code() {
            return Err(ComputeError::Validation(format!(
                "cashbox {} holds {}, not {}",
                cashbox.id,
                cashbox.currency_code,
                money.currency_code()
            )));
        }
        if let Some(contract_id) = new.contract_id {
            let contract = self.scoped_contract(new.tenant_id, new.company_id, contract_id).await?;
            if contract.currency_code != money.currency_code() {
                return Err(ComputeError::Validation(format!(
                    "contract {} is in {}, not {}",
                    contract.id,
                    contract.currency_code,
                    money.currency_code()
                )));
            }
        }

        let created = transaction::ActiveModel {
            tenant_id: Set(new.tenant_id),
            company_id: Set(new.company_id),
            cashbox_id: Set(cashbox.id),
            counterparty: Set(new.counterparty),
            kind: Set(new.kind),
            direction: Set(new.direction),
            amount: Set(new.amount),
            currency_code: Set(money.currency_code().to_string()),
            occurred_at: Set(new.occurred_at),
            contract_id: Set(new.contract_id),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        info!(transaction_id = created.id, "Transaction created");
        self.events
            .publish(DomainEvent::TransactionCreated(TransactionContext::from(&created)))
            .await;
        Ok(created)
    }

    #[instrument(skip(self, update))]
    pub async fn update_transaction(
        &self,
        tenant_id: i32,
        transaction_id: i32,
        update: TransactionUpdate,
    ) -> Result<transaction::Model> {
        let existing = self.scoped_transaction(tenant_id, transaction_id).await?;
        let previous = TransactionContext::from(&existing);

        if let Some(amount) = update.amount {
            validate_amount(amount)?;
        }
        if let Some(cashbox_id) = update.cashbox_id {
            let cashbox = self.scoped_cashbox(tenant_id, existing.company_id, cashbox_id).await?;
            if cashbox.currency_code != existing.currency_code {
                return Err(ComputeError::Validation(format!(
                    "cashbox {} holds {}, not {}",
                    cashbox.id, cashbox.currency_code, existing.currency_code
                )));
            }
        }

        let mut active: transaction::ActiveModel = existing.into();
        if let Some(cashbox_id) = update.cashbox_id {
            active.cashbox_id = Set(cashbox_id);
        }
        if let Some(counterparty) = update.counterparty {
            active.counterparty = Set(counterparty);
        }
        if let Some(kind) = update.kind {
            active.kind = Set(kind);
        }
        if let Some(direction) = update.direction {
            active.direction = Set(direction);
        }
        if let Some(amount) = update.amount {
            active.amount = Set(amount);
        }
        if let Some(occurred_at) = update.occurred_at {
            active.occurred_at = Set(occurred_at);
        }
        let updated = active.update(&self.db).await?;

        info!("Transaction updated");
        self.events
            .publish(DomainEvent::TransactionUpdated {
                previous,
                current: TransactionContext::from(&updated),
            })
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_transaction(&self, tenant_id: i32, transaction_id: i32) -> Result<()> {
        let existing = self.scoped_transaction(tenant_id, transaction_id).await?;
        let context = TransactionContext::from(&existing);
        existing.delete(&self.db).await?;

        info!("Transaction deleted");
        self.events.publish(DomainEvent::TransactionDeleted(context)).await;
        Ok(())
    }

    /// Links an existing transaction to a contract of the same company.
    #[instrument(skip(self))]
    pub async fn apply_payment(
        &self,
        tenant_id: i32,
        transaction_id: i32,
        contract_id: i32,
    ) -> Result<transaction::Model> {
        let existing = self.scoped_transaction(tenant_id, transaction_id).await?;
        let contract = self.scoped_contract(tenant_id, existing.company_id, contract_id).await?;
        if contract.currency_code != existing.currency_code {
            return Err(ComputeError::Validation(format!(
                "contract {} is in {}, payment is in {}",
                contract.id, contract.currency_code, existing.currency_code
            )));
        }

        let previous_contract_id = existing.contract_id.filter(|id| *id != contract.id);
        let mut active: transaction::ActiveModel = existing.into();
        active.contract_id = Set(Some(contract.id));
        let updated = active.update(&self.db).await?;

        info!("Payment applied");
        self.events
            .publish(DomainEvent::PaymentApplied(PaymentContext {
                transaction_id: updated.id,
                tenant_id,
                company_id: updated.company_id,
                contract_id: contract.id,
                previous_contract_id,
            }))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn set_opening_balance(
        &self,
        tenant_id: i32,
        cashbox_id: i32,
        amount: Decimal,
    ) -> Result<cashbox::Model> {
        let existing = cashbox::Entity::find_by_id(cashbox_id)
            .filter(cashbox::Column::TenantId.eq(tenant_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| ComputeError::NotFound(format!("cashbox {}", cashbox_id)))?;

        let mut active: cashbox::ActiveModel = existing.into();
        active.opening_balance = Set(amount);
        let updated = active.update(&self.db).await?;

        info!("Opening balance changed");
        self.events
            .publish(DomainEvent::CashboxBalanceChanged(CashboxContext {
                tenant_id,
                company_id: updated.company_id,
                cashbox_id: updated.id,
                effective_from: None,
            }))
            .await;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::testing::*;
    use crate::time::TimeSource;
    use model::entities::contract::ContractStatus;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn ledger(db: &DatabaseConnection) -> LedgerService<EventBus> {
        let bus = EventBus::new(db.clone(), TimeSource::fixed(at(2025, 1, 6, 0)))
            .with_retry_delay(Duration::ZERO);
        LedgerService::new(db.clone(), bus)
    }

    fn new_tx(cashbox: &cashbox::Model, direction: Direction, amount: Decimal) -> NewTransaction {
        NewTransaction {
            tenant_id: cashbox.tenant_id,
            company_id: cashbox.company_id,
            cashbox_id: cashbox.id,
            counterparty: None,
            kind: match direction {
                Direction::Inflow => TransactionKind::Income,
                Direction::Outflow => TransactionKind::Outcome,
            },
            direction,
            amount,
            currency_code: cashbox.currency_code.clone(),
            occurred_at: at(2025, 1, 5, 9),
            contract_id: None,
        }
    }

    async fn cached_balance(db: &DatabaseConnection, id: i32) -> Decimal {
        cashbox::Entity::find_by_id(id).one(db).await.unwrap().unwrap().cached_balance
    }

    #[tokio::test]
    async fn test_cached_balance_follows_mutations() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let cashbox = new_cashbox(&db, &tenant, &company, "EUR").await.unwrap();
        let ledger = ledger(&db);

        ledger.create_transaction(new_tx(&cashbox, Direction::Inflow, dec!(1000))).await.unwrap();
        let outflow = ledger.create_transaction(new_tx(&cashbox, Direction::Outflow, dec!(300))).await.unwrap();
        assert_eq!(cached_balance(&db, cashbox.id).await, dec!(700));

        ledger
            .update_transaction(
                tenant.id,
                outflow.id,
                TransactionUpdate {
                    amount: Some(dec!(400)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cached_balance(&db, cashbox.id).await, dec!(600));

        ledger.delete_transaction(tenant.id, outflow.id).await.unwrap();
        assert_eq!(cached_balance(&db, cashbox.id).await, dec!(1000));

        ledger.set_opening_balance(tenant.id, cashbox.id, dec!(50)).await.unwrap();
        assert_eq!(cached_balance(&db, cashbox.id).await, dec!(1050));
    }

    #[tokio::test]
    async fn test_moving_transaction_recalculates_both_cashboxes() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let first = new_cashbox(&db, &tenant, &company, "EUR").await.unwrap();
        let second = new_cashbox(&db, &tenant, &company, "EUR").await.unwrap();
        let ledger = ledger(&db);

        let tx = ledger.create_transaction(new_tx(&first, Direction::Inflow, dec!(80))).await.unwrap();
        ledger
            .update_transaction(
                tenant.id,
                tx.id,
                TransactionUpdate {
                    cashbox_id: Some(second.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(cached_balance(&db, first.id).await, Decimal::ZERO);
        assert_eq!(cached_balance(&db, second.id).await, dec!(80));
    }

    #[tokio::test]
    async fn test_invalid_mutations_are_rejected() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let (_, foreign_company) = new_tenant_company(&db).await.unwrap();
        let cashbox = new_cashbox(&db, &tenant, &company, "EUR").await.unwrap();
        let ledger = ledger(&db);

        let err = ledger
            .create_transaction(new_tx(&cashbox, Direction::Inflow, dec!(-1)))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let mut wrong_currency = new_tx(&cashbox, Direction::Inflow, dec!(1));
        wrong_currency.currency_code = "USD".to_string();
        assert!(ledger.create_transaction(wrong_currency).await.unwrap_err().is_validation());

        let mut wrong_company = new_tx(&cashbox, Direction::Inflow, dec!(1));
        wrong_company.company_id = foreign_company.id;
        assert!(ledger.create_transaction(wrong_company).await.unwrap_err().is_validation());

        let mut wrong_tenant = new_tx(&cashbox, Direction::Inflow, dec!(1));
        wrong_tenant.tenant_id = foreign_company.tenant_id;
        assert!(ledger.create_transaction(wrong_tenant).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_mutation_survives_listener_failure() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let cashbox = new_cashbox(&db, &tenant, &company, "EUR").await.unwrap();
        new_raw_transaction(&db, &cashbox, TransactionKind::Income, Direction::Inflow, dec!(5), "USD", at(2025, 1, 4, 9))
            .await
            .unwrap();
        let ledger = ledger(&db);

        let created = ledger.create_transaction(new_tx(&cashbox, Direction::Inflow, dec!(10))).await.unwrap();

        let stored = transaction::Entity::find_by_id(created.id).one(&db).await.unwrap();
        assert!(stored.is_some());
        assert_eq!(cached_balance(&db, cashbox.id).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_apply_payment_updates_contract() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let cashbox = new_cashbox(&db, &tenant, &company, "EUR").await.unwrap();
        let contract = new_contract(&db, &company, dec!(1000), date(2025, 1, 1)).await.unwrap();
        let ledger = ledger(&db);

        let first = ledger.create_transaction(new_tx(&cashbox, Direction::Inflow, dec!(250))).await.unwrap();
        ledger.apply_payment(tenant.id, first.id, contract.id).await.unwrap();

        let stored = contract::Entity::find_by_id(contract.id).one(&db).await.unwrap().unwrap();
        assert_eq!(stored.paid_amount, dec!(250));
        assert_eq!(stored.balance, dec!(750));
        assert_eq!(stored.status, ContractStatus::PartiallyPaid);

        let mut second = new_tx(&cashbox, Direction::Inflow, dec!(750));
        second.contract_id = Some(contract.id);
        ledger.create_transaction(second).await.unwrap();

        let stored = contract::Entity::find_by_id(contract.id).one(&db).await.unwrap().unwrap();
        assert_eq!(stored.status, ContractStatus::Settled);
    }

    #[tokio::test]
    async fn test_payment_against_foreign_company_contract_is_rejected() {
        let db = setup_db().await.unwrap();
        let (tenant, company) = new_tenant_company(&db).await.unwrap();
        let (_, other_company) = new_tenant_company(&db).await.unwrap();
        let cashbox = new_cashbox(&db, &tenant, &company, "EUR").await.unwrap();
        let contract = new_contract(&db, &other_company, dec!(100), date(2025, 1, 1)).await.unwrap();
        let ledger = ledger(&db);

        let tx = ledger.create_transaction(new_tx(&cashbox, Direction::Inflow, dec!(10))).await.unwrap();
        let err = ledger.apply_payment(tenant.id, tx.id, contract.id).await.unwrap_err();
        assert!(err.is_validation());
    }
}
