use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

use super::company;

/// A named pool of money scoped to a tenant and company.
///
/// The balance is derived from the ledger; `cached_balance` is only a
/// performance copy maintained by the recalculation listeners.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cashboxes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub tenant_id: i32,
    pub company_id: i32,
    pub name: String,
    /// ISO 4217 currency code, e.g., "USD", "EUR".
    pub currency_code: String,
    /// Balance the cashbox started with before any recorded transaction.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub opening_balance: Decimal,
    /// Last balance computed by the recalculation listener.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub cached_balance: Decimal,
    /// When `cached_balance` was last recomputed.
    pub balance_updated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "company::Entity",
        from = "Column::CompanyId",
        to = "company::Column::Id",
        on_delete = "Cascade"
    )]
    Company,
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transaction,
    #[sea_orm(has_many = "super::cashbox_history::Entity")]
    CashboxHistory,
    #[sea_orm(has_many = "super::cashbox_balance_snapshot::Entity")]
    CashboxBalanceSnapshot,
}

impl Related<company::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Company.def()
    }
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
