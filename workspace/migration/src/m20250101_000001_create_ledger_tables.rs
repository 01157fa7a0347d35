use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create tenants table
        manager
            .create_table(
                Table::create()
                    .table(Tenants::Table)
                    .if_not_exists()
                    .col(pk_auto(Tenants::Id))
                    .col(string(Tenants::Name))
                    .to_owned(),
            )
            .await?;

        // Create companies table
        manager
            .create_table(
                Table::create()
                    .table(Companies::Table)
                    .if_not_exists()
                    .col(pk_auto(Companies::Id))
                    .col(integer(Companies::TenantId))
                    .col(string(Companies::Name))
                    .col(boolean(Companies::IsActive).default(true))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_company_tenant")
                            .from(Companies::Table, Companies::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create cashboxes table
        manager
            .create_table(
                Table::create()
                    .table(Cashboxes::Table)
                    .if_not_exists()
                    .col(pk_auto(Cashboxes::Id))
                    .col(integer(Cashboxes::TenantId))
                    .col(integer(Cashboxes::CompanyId))
                    .col(string(Cashboxes::Name))
                    .col(string_len(Cashboxes::CurrencyCode, 3))
                    .col(decimal_len(Cashboxes::OpeningBalance, 16, 4).default(0))
                    .col(decimal_len(Cashboxes::CachedBalance, 16, 4).default(0))
                    .col(timestamp_with_time_zone_null(Cashboxes::BalanceUpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_cashbox_company")
                            .from(Cashboxes::Table, Cashboxes::CompanyId)
                            .to(Companies::Table, Companies::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create contracts table
        manager
            .create_table(
                Table::create()
                    .table(Contracts::Table)
                    .if_not_exists()
                    .col(pk_auto(Contracts::Id))
                    .col(integer(Contracts::TenantId))
                    .col(integer(Contracts::CompanyId))
                    .col(string(Contracts::Counterparty))
                    .col(string(Contracts::Number))
                    .col(decimal_len(Contracts::TotalAmount, 16, 4))
                    .col(string_len(Contracts::CurrencyCode, 3))
                    .col(date(Contracts::SignedOn))
                    .col(decimal_len(Contracts::PaidAmount, 16, 4).default(0))
                    .col(decimal_len(Contracts::Balance, 16, 4).default(0))
                    .col(string_len(Contracts::Status, 20).default("open"))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_contract_company")
                            .from(Contracts::Table, Contracts::CompanyId)
                            .to(Companies::Table, Companies::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create transactions table
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(pk_auto(Transactions::Id))
                    .col(integer(Transactions::TenantId))
                    .col(integer(Transactions::CompanyId))
                    .col(integer(Transactions::CashboxId))
                    .col(string_null(Transactions::Counterparty))
                    .col(string_len(Transactions::Kind, 20))
                    .col(string_len(Transactions::Direction, 10))
                    .col(decimal_len(Transactions::Amount, 16, 4))
                    .col(string_len(Transactions::CurrencyCode, 3))
                    .col(timestamp_with_time_zone(Transactions::OccurredAt))
                    .col(integer_null(Transactions::ContractId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transaction_cashbox")
                            .from(Transactions::Table, Transactions::CashboxId)
                            .to(Cashboxes::Table, Cashboxes::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transaction_contract")
                            .from(Transactions::Table, Transactions::ContractId)
                            .to(Contracts::Table, Contracts::Id)
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_cashbox_occurred")
                    .table(Transactions::Table)
                    .col(Transactions::CashboxId)
                    .col(Transactions::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_company_occurred")
                    .table(Transactions::Table)
                    .col(Transactions::CompanyId)
                    .col(Transactions::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_contract")
                    .table(Transactions::Table)
                    .col(Transactions::ContractId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop tables in reverse order to respect foreign key constraints
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Contracts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Cashboxes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Companies::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tenants::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum Companies {
    Table,
    Id,
    TenantId,
    Name,
    IsActive,
}

#[derive(DeriveIden)]
enum Cashboxes {
    Table,
    Id,
    TenantId,
    CompanyId,
    Name,
    CurrencyCode,
    OpeningBalance,
    CachedBalance,
    BalanceUpdatedAt,
}

#[derive(DeriveIden)]
enum Contracts {
    Table,
    Id,
    TenantId,
    CompanyId,
    Counterparty,
    Number,
    TotalAmount,
    CurrencyCode,
    SignedOn,
    PaidAmount,
    Balance,
    Status,
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Id,
    TenantId,
    CompanyId,
    CashboxId,
    Counterparty,
    Kind,
    Direction,
    Amount,
    CurrencyCode,
    OccurredAt,
    ContractId,
}
