//! This file serves as the root for all SeaORM entity modules.
//! Ledger tables (tenants, companies, cashboxes, transactions, contracts) are
//! written by the mutation paths; the remaining tables are derived state
//! owned by the recalculation listeners, the snapshot job and the report
//! builds.

pub mod build_run;
pub mod cashbox;
pub mod cashbox_balance_snapshot;
pub mod cashbox_history;
pub mod company;
pub mod contract;
pub mod debt_snapshot_row;
pub mod job_lock;
pub mod materialized_cashflow_row;
pub mod materialized_pnl_row;
pub mod tenant;
pub mod transaction;

pub mod prelude {
    //! A prelude module for easy importing of all entities.
    pub use super::build_run::Entity as BuildRun;
    pub use super::cashbox::Entity as Cashbox;
    pub use super::cashbox_balance_snapshot::Entity as CashboxBalanceSnapshot;
    pub use super::cashbox_history::Entity as CashboxHistory;
    pub use super::company::Entity as Company;
    pub use super::contract::Entity as Contract;
    pub use super::debt_snapshot_row::Entity as DebtSnapshotRow;
    pub use super::job_lock::Entity as JobLock;
    pub use super::materialized_cashflow_row::Entity as MaterializedCashflowRow;
    pub use super::materialized_pnl_row::Entity as MaterializedPnlRow;
    pub use super::tenant::Entity as Tenant;
    pub use super::transaction::Entity as Transaction;
}
