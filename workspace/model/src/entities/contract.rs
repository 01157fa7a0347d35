use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

use super::company;

/// Settlement state derived from how much of a contract has been paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum ContractStatus {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "partially_paid")]
    PartiallyPaid,
    #[sea_orm(string_value = "settled")]
    Settled,
}

impl ContractStatus {
    /// Status for a contract worth `total` of which `paid` has been received.
    pub fn derive(total: Decimal, paid: Decimal) -> Self {
        if paid <= Decimal::ZERO {
            ContractStatus::Open
        } else if paid < total {
            ContractStatus::PartiallyPaid
        } else {
            ContractStatus::Settled
        }
    }
}

/// An agreement with a counterparty that payments are applied against.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "contracts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub tenant_id: i32,
    pub company_id: i32,
    pub counterparty: String,
    pub number: String,
    /// Total obligation of the counterparty.
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total_amount: Decimal,
    pub currency_code: String,
    pub signed_on: NaiveDate,
    /// Sum of payments applied so far (derived).
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub paid_amount: Decimal,
    /// Outstanding amount, `total_amount - paid_amount` (derived).
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub balance: Decimal,
    pub status: ContractStatus,
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
