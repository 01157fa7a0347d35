use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

/// Cash movement of one cashbox on one day, rebuilt by the cash-flow builds.
///
/// Keyed by `(company_id, cashbox_id, date)` so a rebuild replaces rows
/// instead of accumulating them.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "materialized_cashflow_rows")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub company_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub cashbox_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub date: NaiveDate,
    pub tenant_id: i32,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub inflow: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub outflow: Decimal,
    /// `inflow - outflow`
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total: Decimal,
    pub transaction_count: i64,
    pub currency_code: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
