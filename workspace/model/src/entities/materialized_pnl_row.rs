use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

/// Monthly profit and loss per currency, rebuilt by the P&L build.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "materialized_pnl_rows")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub company_id: i32,
    /// First day of the month.
    #[sea_orm(primary_key, auto_increment = false)]
    pub period: NaiveDate,
    #[sea_orm(primary_key, auto_increment = false)]
    pub currency_code: String,
    pub tenant_id: i32,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub revenue: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub expenses: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub net_profit: Decimal,
    pub transaction_count: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
