use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

/// Outstanding debt of a contract at the end of `snapshot_date`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "debt_snapshot_rows")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub company_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub snapshot_date: NaiveDate,
    #[sea_orm(primary_key, auto_increment = false)]
    pub contract_id: i32,
    pub tenant_id: i32,
    pub counterparty: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub obligation: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub paid: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub debt: Decimal,
    pub currency_code: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
