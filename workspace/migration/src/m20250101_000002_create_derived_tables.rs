use model::entities::{cashbox, prelude::Cashbox};
use sea_orm_migration::{prelude::*, schema::*};

use crate::entity_iden::EntityIden;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Per-day cashbox history maintained by the recalculation listeners
        manager
            .create_table(
                Table::create()
                    .table(CashboxHistory::Table)
                    .if_not_exists()
                    .col(integer(CashboxHistory::CashboxId))
                    .col(date(CashboxHistory::Date))
                    .col(integer(CashboxHistory::TenantId))
                    .col(integer(CashboxHistory::CompanyId))
                    .col(decimal_len(CashboxHistory::Inflow, 16, 4))
                    .col(decimal_len(CashboxHistory::Outflow, 16, 4))
                    .col(decimal_len(CashboxHistory::ClosingBalance, 16, 4))
                    .col(string_len(CashboxHistory::CurrencyCode, 3))
                    .primary_key(
                        Index::create()
                            .name("pk_cashbox_history")
                            .col(CashboxHistory::CashboxId)
                            .col(CashboxHistory::Date),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_cashbox_history_cashbox")
                            .from(CashboxHistory::Table, CashboxHistory::CashboxId)
                            .to(Cashbox::table(), Cashbox::column(cashbox::Column::Id))
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Append-only balance snapshots
        manager
            .create_table(
                Table::create()
                    .table(CashboxBalanceSnapshots::Table)
                    .if_not_exists()
                    .col(pk_auto(CashboxBalanceSnapshots::Id))
                    .col(integer(CashboxBalanceSnapshots::TenantId))
                    .col(integer(CashboxBalanceSnapshots::CompanyId))
                    .col(integer(CashboxBalanceSnapshots::CashboxId))
                    .col(decimal_len(CashboxBalanceSnapshots::Balance, 16, 4))
                    .col(string_len(CashboxBalanceSnapshots::CurrencyCode, 3))
                    .col(timestamp_with_time_zone(CashboxBalanceSnapshots::CalculatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_balance_snapshot_cashbox")
                            .from(CashboxBalanceSnapshots::Table, CashboxBalanceSnapshots::CashboxId)
                            .to(Cashbox::table(), Cashbox::column(cashbox::Column::Id))
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_balance_snapshots_cashbox_calculated")
                    .table(CashboxBalanceSnapshots::Table)
                    .col(CashboxBalanceSnapshots::CashboxId)
                    .col(CashboxBalanceSnapshots::CalculatedAt)
                    .to_owned(),
            )
            .await?;

        // Materialized cash-flow rows, one per (company, cashbox, day)
        manager
            .create_table(
                Table::create()
                    .table(MaterializedCashflowRows::Table)
                    .if_not_exists()
                    .col(integer(MaterializedCashflowRows::CompanyId))
                    .col(integer(MaterializedCashflowRows::CashboxId))
                    .col(date(MaterializedCashflowRows::Date))
                    .col(integer(MaterializedCashflowRows::TenantId))
                    .col(decimal_len(MaterializedCashflowRows::Inflow, 16, 4))
                    .col(decimal_len(MaterializedCashflowRows::Outflow, 16, 4))
                    .col(decimal_len(MaterializedCashflowRows::Total, 16, 4))
                    .col(big_integer(MaterializedCashflowRows::TransactionCount))
                    .col(string_len(MaterializedCashflowRows::CurrencyCode, 3))
                    .primary_key(
                        Index::create()
                            .name("pk_materialized_cashflow_rows")
                            .col(MaterializedCashflowRows::CompanyId)
                            .col(MaterializedCashflowRows::CashboxId)
                            .col(MaterializedCashflowRows::Date),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_materialized_cashflow_company_date")
                    .table(MaterializedCashflowRows::Table)
                    .col(MaterializedCashflowRows::CompanyId)
                    .col(MaterializedCashflowRows::Date)
                    .to_owned(),
            )
            .await?;

        // Materialized P&L rows, one per (company, month, currency)
        manager
            .create_table(
                Table::create()
                    .table(MaterializedPnlRows::Table)
                    .if_not_exists()
                    .col(integer(MaterializedPnlRows::CompanyId))
                    .col(date(MaterializedPnlRows::Period))
                    .col(string_len(MaterializedPnlRows::CurrencyCode, 3))
                    .col(integer(MaterializedPnlRows::TenantId))
                    .col(decimal_len(MaterializedPnlRows::Revenue, 16, 4))
                    .col(decimal_len(MaterializedPnlRows::Expenses, 16, 4))
                    .col(decimal_len(MaterializedPnlRows::NetProfit, 16, 4))
                    .col(big_integer(MaterializedPnlRows::TransactionCount))
                    .primary_key(
                        Index::create()
                            .name("pk_materialized_pnl_rows")
                            .col(MaterializedPnlRows::CompanyId)
                            .col(MaterializedPnlRows::Period)
                            .col(MaterializedPnlRows::CurrencyCode),
                    )
                    .to_owned(),
            )
            .await?;

        // Debt snapshot rows, one per (company, date, contract)
        manager
            .create_table(
                Table::create()
                    .table(DebtSnapshotRows::Table)
                    .if_not_exists()
                    .col(integer(DebtSnapshotRows::CompanyId))
                    .col(date(DebtSnapshotRows::SnapshotDate))
                    .col(integer(DebtSnapshotRows::ContractId))
                    .col(integer(DebtSnapshotRows::TenantId))
                    .col(string(DebtSnapshotRows::Counterparty))
                    .col(decimal_len(DebtSnapshotRows::Obligation, 16, 4))
                    .col(decimal_len(DebtSnapshotRows::Paid, 16, 4))
                    .col(decimal_len(DebtSnapshotRows::Debt, 16, 4))
                    .col(string_len(DebtSnapshotRows::CurrencyCode, 3))
                    .primary_key(
                        Index::create()
                            .name("pk_debt_snapshot_rows")
                            .col(DebtSnapshotRows::CompanyId)
                            .col(DebtSnapshotRows::SnapshotDate)
                            .col(DebtSnapshotRows::ContractId),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DebtSnapshotRows::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MaterializedPnlRows::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MaterializedCashflowRows::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CashboxBalanceSnapshots::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CashboxHistory::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum CashboxHistory {
    Table,
    CashboxId,
    Date,
    TenantId,
    CompanyId,
    Inflow,
    Outflow,
    ClosingBalance,
    CurrencyCode,
}

#[derive(DeriveIden)]
enum CashboxBalanceSnapshots {
    Table,
    Id,
    TenantId,
    CompanyId,
    CashboxId,
    Balance,
    CurrencyCode,
    CalculatedAt,
}

#[derive(DeriveIden)]
enum MaterializedCashflowRows {
    Table,
    CompanyId,
    CashboxId,
    Date,
    TenantId,
    Inflow,
    Outflow,
    Total,
    TransactionCount,
    CurrencyCode,
}

#[derive(DeriveIden)]
enum MaterializedPnlRows {
    Table,
    CompanyId,
    Period,
    CurrencyCode,
    TenantId,
    Revenue,
    Expenses,
    NetProfit,
    TransactionCount,
}

#[derive(DeriveIden)]
enum DebtSnapshotRows {
    Table,
    CompanyId,
    SnapshotDate,
    ContractId,
    TenantId,
    Counterparty,
    Obligation,
    Paid,
    Debt,
    CurrencyCode,
}
