//! Database fixtures shared by the pipeline tests.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, DbErr, Set};

use migration::{Migrator, MigratorTrait};
use model::entities::{
    cashbox, company, contract,
    contract::ContractStatus,
    tenant, transaction,
    transaction::{Direction, TransactionKind},
};

pub type Result<T> = std::result::Result<T, DbErr>;

static FIXTURE_ID: AtomicU64 = AtomicU64::new(0);

fn next_id() -> u64 {
    FIXTURE_ID.fetch_add(1, Ordering::SeqCst)
}

pub async fn setup_db() -> Result<DatabaseConnection> {
    // Connect to the SQLite database
    let db = Database::connect("sqlite::memory:").await?;

    // Enable foreign keys
    db.execute_unprepared("PRAGMA foreign_keys = ON;").await?;

    Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub async fn new_tenant(db: &DatabaseConnection) -> Result<tenant::Model> {
    tenant::ActiveModel {
        name: Set(format!("Tenant {}", next_id())),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn new_company(db: &DatabaseConnection, tenant: &tenant::Model) -> Result<company::Model> {
    company::ActiveModel {
        tenant_id: Set(tenant.id),
        name: Set(format!("Company {}", next_id())),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn new_tenant_company(db: &DatabaseConnection) -> Result<(tenant::Model, company::Model)> {
    let tenant = new_tenant(db).await?;
    let company = new_company(db, &tenant).await?;
    Ok((tenant, company))
}

pub async fn new_cashbox(
    db: &DatabaseConnection,
    tenant: &tenant::Model,
    company: &company::Model,
    currency_code: &str,
) -> Result<cashbox::Model> {
    new_cashbox_with_opening(db, tenant, company, currency_code, Decimal::ZERO).await
}

pub async fn new_cashbox_with_opening(
    db: &DatabaseConnection,
    tenant: &tenant::Model,
    company: &company::Model,
    currency_code: &str,
    opening_balance: Decimal,
) -> Result<cashbox::Model> {
    cashbox::ActiveModel {
        tenant_id: Set(tenant.id),
        company_id: Set(company.id),
        name: Set(format!("Cashbox {}", next_id())),
        currency_code: Set(currency_code.to_string()),
        opening_balance: Set(opening_balance),
        cached_balance: Set(Decimal::ZERO),
        balance_updated_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Income for inflows, outcome for outflows, in the cashbox currency.
pub async fn new_transaction(
    db: &DatabaseConnection,
    cashbox: &cashbox::Model,
    direction: Direction,
    amount: Decimal,
    occurred_at: DateTime<Utc>,
) -> Result<transaction::Model> {
    let kind = match direction {
        Direction::Inflow => TransactionKind::Income,
        Direction::Outflow => TransactionKind::Outcome,
    };
    new_raw_transaction(db, cashbox, kind, direction, amount, &cashbox.currency_code, occurred_at).await
}

/// Inserts a transaction without any validation, bypassing the ledger service.
pub async fn new_raw_transaction(
    db: &DatabaseConnection,
    cashbox: &cashbox::Model,
    kind: TransactionKind,
    direction: Direction,
    amount: Decimal,
    currency_code: &str,
    occurred_at: DateTime<Utc>,
) -> Result<transaction::Model> {
    transaction::ActiveModel {
        tenant_id: Set(cashbox.tenant_id),
        company_id: Set(cashbox.company_id),
        cashbox_id: Set(cashbox.id),
        counterparty: Set(None),
        kind: Set(kind),
        direction: Set(direction),
        amount: Set(amount),
        currency_code: Set(currency_code.to_string()),
        occurred_at: Set(occurred_at),
        contract_id: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn new_contract(
    db: &DatabaseConnection,
    company: &company::Model,
    total_amount: Decimal,
    signed_on: NaiveDate,
) -> Result<contract::Model> {
    contract::ActiveModel {
        tenant_id: Set(company.tenant_id),
        company_id: Set(company.id),
        counterparty: Set(format!("Counterparty {}", next_id())),
        number: Set(format!("C-{}", next_id())),
        total_amount: Set(total_amount),
        currency_code: Set("EUR".to_string()),
        signed_on: Set(signed_on),
        paid_amount: Set(Decimal::ZERO),
        balance: Set(total_amount),
        status: Set(ContractStatus::Open),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Income on `cashbox` already linked to `contract`.
pub async fn new_payment(
    db: &DatabaseConnection,
    cashbox: &cashbox::Model,
    contract: &contract::Model,
    amount: Decimal,
    occurred_at: DateTime<Utc>,
) -> Result<transaction::Model> {
    transaction::ActiveModel {
        tenant_id: Set(cashbox.tenant_id),
        company_id: Set(cashbox.company_id),
        cashbox_id: Set(cashbox.id),
        counterparty: Set(Some(contract.counterparty.clone())),
        kind: Set(TransactionKind::Income),
        direction: Set(Direction::Inflow),
        amount: Set(amount),
        currency_code: Set(cashbox.currency_code.clone()),
        occurred_at: Set(occurred_at),
        contract_id: Set(Some(contract.id)),
        ..Default::default()
    }
    .insert(db)
    .await
}
