use sea_orm::entity::prelude::*;

/// Outcome of a report build invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
pub enum BuildStatus {
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "skipped")]
    Skipped,
}

/// Audit record of one scheduled or manual report build.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "build_runs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Job name, e.g. `cashflow:day`.
    pub job: String,
    pub company_id: i32,
    /// Period identifier as passed to the build (`YYYY-MM-DD` or `YYYY-MM`).
    pub period: String,
    pub status: BuildStatus,
    pub rows_written: i64,
    pub error: Option<String>,
    pub started_at: DateTimeUtc,
    pub finished_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
