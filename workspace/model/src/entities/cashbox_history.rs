use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

use super::cashbox;

/// Per-day movement summary of a cashbox with the closing balance of that day.
/// Maintained by the cashbox history listener.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cashbox_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub cashbox_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub date: NaiveDate,
    pub tenant_id: i32,
    pub company_id: i32,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub inflow: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub outflow: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub closing_balance: Decimal,
    pub currency_code: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "cashbox::Entity",
        from = "Column::CashboxId",
        to = "cashbox::Column::Id",
        on_delete = "Cascade"
    )]
    Cashbox,
}

impl Related<cashbox::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cashbox.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
