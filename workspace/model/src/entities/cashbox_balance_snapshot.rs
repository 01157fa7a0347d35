use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

use super::cashbox;

/// Point-in-time balance of a cashbox. Rows are only ever appended.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cashbox_balance_snapshots")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub tenant_id: i32,
    pub company_id: i32,
    pub cashbox_id: i32,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub balance: Decimal,
    pub currency_code: String,
    pub calculated_at: DateTimeUtc,
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
