use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

use super::{cashbox, contract};

/// Business category of a ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum TransactionKind {
    #[sea_orm(string_value = "income")]
    Income,
    #[sea_orm(string_value = "outcome")]
    Outcome,
    #[sea_orm(string_value = "transfer")]
    Transfer,
    #[sea_orm(string_value = "advance")]
    Advance,
    #[sea_orm(string_value = "refund")]
    Refund,
    #[sea_orm(string_value = "director_loan")]
    DirectorLoan,
}

/// Whether money enters or leaves the cashbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
pub enum Direction {
    #[sea_orm(string_value = "inflow")]
    Inflow,
    #[sea_orm(string_value = "outflow")]
    Outflow,
}

impl Direction {
    /// Applies the direction to a non-negative amount.
    pub fn apply(&self, amount: Decimal) -> Decimal {
        match self {
            Direction::Inflow => amount,
            Direction::Outflow => -amount,
        }
    }
}

/// A single financial movement on a cashbox.
///
/// `amount` is never negative; the sign lives in `direction`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub tenant_id: i32,
    pub company_id: i32,
    pub cashbox_id: i32,
    /// Free-form reference to the other party of the movement.
    pub counterparty: Option<String>,
    pub kind: TransactionKind,
    pub direction: Direction,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub amount: Decimal,
    pub currency_code: String,
    pub occurred_at: DateTimeUtc,
    /// Set when the movement is a payment against a contract.
    pub contract_id: Option<i32>,
}

impl Model {
    /// Amount with the direction applied: positive for inflows.
    pub fn signed_amount(&self) -> Decimal {
        self.direction.apply(self.amount)
    }
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
    #[sea_orm(
        belongs_to = "contract::Entity",
        from = "Column::ContractId",
        to = "contract::Column::Id",
        on_delete = "SetNull"
    )]
    Contract,
}

impl Related<cashbox::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cashbox.def()
    }
}

impl Related<contract::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contract.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
