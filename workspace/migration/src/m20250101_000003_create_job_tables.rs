use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Advisory locks used by the overlap guard
        manager
            .create_table(
                Table::create()
                    .table(JobLocks::Table)
                    .if_not_exists()
                    .col(string(JobLocks::Name).primary_key())
                    .col(string(JobLocks::Owner))
                    .col(timestamp_with_time_zone(JobLocks::AcquiredAt))
                    .col(timestamp_with_time_zone(JobLocks::ExpiresAt))
                    .to_owned(),
            )
            .await?;

        // Build run audit log
        manager
            .create_table(
                Table::create()
                    .table(BuildRuns::Table)
                    .if_not_exists()
                    .col(pk_auto(BuildRuns::Id))
                    .col(string(BuildRuns::Job))
                    .col(integer(BuildRuns::CompanyId))
                    .col(string(BuildRuns::Period))
                    .col(string_len(BuildRuns::Status, 10))
                    .col(big_integer(BuildRuns::RowsWritten).default(0))
                    .col(text_null(BuildRuns::Error))
                    .col(timestamp_with_time_zone(BuildRuns::StartedAt))
                    .col(timestamp_with_time_zone(BuildRuns::FinishedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_build_runs_job_company")
                    .table(BuildRuns::Table)
                    .col(BuildRuns::Job)
                    .col(BuildRuns::CompanyId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BuildRuns::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(JobLocks::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum JobLocks {
    Table,
    Name,
    Owner,
    AcquiredAt,
    ExpiresAt,
}

#[derive(DeriveIden)]
enum BuildRuns {
    Table,
    Id,
    Job,
    CompanyId,
    Period,
    Status,
    RowsWritten,
    Error,
    StartedAt,
    FinishedAt,
}
