use sea_orm::entity::prelude::*;

use super::tenant;

/// A business unit owned by a tenant. Finance data is scoped per company.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "companies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub tenant_id: i32,
    pub name: String,
    /// Inactive companies are skipped by the scheduler.
    #[sea_orm(default_value = "true")]
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "tenant::Entity",
        from = "Column::TenantId",
        to = "tenant::Column::Id",
        on_delete = "Cascade"
    )]
    Tenant,
    #[sea_orm(has_many = "super::cashbox::Entity")]
    Cashbox,
    #[sea_orm(has_many = "super::contract::Entity")]
    Contract,
}

impl Related<tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::cashbox::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cashbox.def()
    }
}

impl Related<super::contract::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contract.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
