//! Typed domain events and their dispatch to the recalculation listeners.
//!
//! Events are a closed enum and the listener set of every variant is fixed by
//! [`DomainEvent::listeners`]. Adding a variant without deciding its listeners
//! does not compile.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use model::entities::transaction;
use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::listeners;
use crate::time::TimeSource;
use crate::FINANCE_TARGET;

/// Identity of a transaction as it was when the event was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionContext {
    pub transaction_id: i32,
    pub tenant_id: i32,
    pub company_id: i32,
    pub cashbox_id: i32,
    pub contract_id: Option<i32>,
    pub occurred_on: NaiveDate,
}

impl From<&transaction::Model> for TransactionContext {
    fn from(tx: &transaction::Model) -> Self {
        Self {
            transaction_id: tx.id,
            tenant_id: tx.tenant_id,
            company_id: tx.company_id,
            cashbox_id: tx.cashbox_id,
            contract_id: tx.contract_id,
            occurred_on: tx.occurred_at.date_naive(),
        }
    }
}

/// A transaction was linked to a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentContext {
    pub transaction_id: i32,
    pub tenant_id: i32,
    pub company_id: i32,
    pub contract_id: i32,
    /// Contract the transaction was linked to before, if any.
    pub previous_contract_id: Option<i32>,
}

/// Something changed the balance of a cashbox without touching a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CashboxContext {
    pub tenant_id: i32,
    pub company_id: i32,
    pub cashbox_id: i32,
    /// First day whose history is affected. `None` means all of it.
    pub effective_from: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    TransactionCreated(TransactionContext),
    TransactionUpdated {
        previous: TransactionContext,
        current: TransactionContext,
    },
    TransactionDeleted(TransactionContext),
    PaymentApplied(PaymentContext),
    CashboxBalanceChanged(CashboxContext),
}

/// The single aggregate a listener is allowed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CashboxHistory,
    CashboxBalance,
    ContractBalance,
    ContractStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listener {
    RecalcCashboxHistory,
    RecalcCashboxAfterTransactionChanged,
    RecalcContractBalance,
    UpdateContractStatus,
}

const TRANSACTION_LISTENERS: &[Listener] = &[
    Listener::RecalcCashboxHistory,
    Listener::RecalcCashboxAfterTransactionChanged,
    Listener::RecalcContractBalance,
    Listener::UpdateContractStatus,
];

const PAYMENT_LISTENERS: &[Listener] = &[
    Listener::RecalcContractBalance,
    Listener::UpdateContractStatus,
];

const CASHBOX_LISTENERS: &[Listener] = &[
    Listener::RecalcCashboxHistory,
    Listener::RecalcCashboxAfterTransactionChanged,
];

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::TransactionCreated(_) => "transaction_created",
            DomainEvent::TransactionUpdated { .. } => "transaction_updated",
            DomainEvent::TransactionDeleted(_) => "transaction_deleted",
            DomainEvent::PaymentApplied(_) => "payment_applied",
            DomainEvent::CashboxBalanceChanged(_) => "cashbox_balance_changed",
        }
    }

    pub fn tenant_id(&self) -> i32 {
        match self {
            DomainEvent::TransactionCreated(ctx) | DomainEvent::TransactionDeleted(ctx) => {
                ctx.tenant_id
            }
            DomainEvent::TransactionUpdated { current, .. } => current.tenant_id,
            DomainEvent::PaymentApplied(ctx) => ctx.tenant_id,
            DomainEvent::CashboxBalanceChanged(ctx) => ctx.tenant_id,
        }
    }

    /// Listeners run for this event, in order.
    pub fn listeners(&self) -> &'static [Listener] {
        match self {
            DomainEvent::TransactionCreated(_)
            | DomainEvent::TransactionUpdated { .. }
            | DomainEvent::TransactionDeleted(_) => TRANSACTION_LISTENERS,
            DomainEvent::PaymentApplied(_) => PAYMENT_LISTENERS,
            DomainEvent::CashboxBalanceChanged(_) => CASHBOX_LISTENERS,
        }
    }

    /// Cashboxes touched by the event with the first affected day.
    ///
    /// An update that moves a transaction to another cashbox touches both.
    pub fn affected_cashboxes(&self) -> Vec<(i32, Option<NaiveDate>)> {
        match self {
            DomainEvent::TransactionCreated(ctx) | DomainEvent::TransactionDeleted(ctx) => {
                vec![(ctx.cashbox_id, Some(ctx.occurred_on))]
            }
            DomainEvent::TransactionUpdated { previous, current } => {
                if previous.cashbox_id == current.cashbox_id {
                    let from = previous.occurred_on.min(current.occurred_on);
                    vec![(current.cashbox_id, Some(from))]
                } else {
                    vec![
                        (previous.cashbox_id, Some(previous.occurred_on)),
                        (current.cashbox_id, Some(current.occurred_on)),
                    ]
                }
            }
            DomainEvent::PaymentApplied(_) => Vec::new(),
            DomainEvent::CashboxBalanceChanged(ctx) => vec![(ctx.cashbox_id, ctx.effective_from)],
        }
    }

    /// Contracts whose paid amount may have changed.
    pub fn affected_contracts(&self) -> Vec<i32> {
        let mut contracts = match self {
            DomainEvent::TransactionCreated(ctx) | DomainEvent::TransactionDeleted(ctx) => {
                ctx.contract_id.into_iter().collect()
            }
            DomainEvent::TransactionUpdated { previous, current } => previous
                .contract_id
                .into_iter()
                .chain(current.contract_id)
                .collect(),
            DomainEvent::PaymentApplied(ctx) => std::iter::once(ctx.contract_id)
                .chain(ctx.previous_contract_id)
                .collect(),
            DomainEvent::CashboxBalanceChanged(_) => Vec::new(),
        };
        contracts.sort_unstable();
        contracts.dedup();
        contracts
    }
}

impl Listener {
    pub fn name(&self) -> &'static str {
        match self {
            Listener::RecalcCashboxHistory => "recalc_cashbox_history",
            Listener::RecalcCashboxAfterTransactionChanged => "recalc_cashbox_after_transaction_changed",
            Listener::RecalcContractBalance => "recalc_contract_balance",
            Listener::UpdateContractStatus => "update_contract_status",
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Listener::RecalcCashboxHistory => Capability::CashboxHistory,
            Listener::RecalcCashboxAfterTransactionChanged => Capability::CashboxBalance,
            Listener::RecalcContractBalance => Capability::ContractBalance,
            Listener::UpdateContractStatus => Capability::ContractStatus,
        }
    }

    async fn handle(&self, db: &DatabaseConnection, event: &DomainEvent, time: &TimeSource) -> Result<()> {
        let tenant_id = event.tenant_id();
        match self {
            Listener::RecalcCashboxHistory => {
                for (cashbox_id, from) in event.affected_cashboxes() {
                    listeners::recalc_cashbox_history(db, tenant_id, cashbox_id, from).await?;
                }
            }
            Listener::RecalcCashboxAfterTransactionChanged => {
                for (cashbox_id, _) in event.affected_cashboxes() {
                    listeners::recalc_cashbox_balance(db, tenant_id, cashbox_id, time.now()).await?;
                }
            }
            Listener::RecalcContractBalance => {
                for contract_id in event.affected_contracts() {
                    listeners::recalc_contract_balance(db, tenant_id, contract_id).await?;
                }
            }
            Listener::UpdateContractStatus => {
                for contract_id in event.affected_contracts() {
                    listeners::update_contract_status(db, tenant_id, contract_id).await?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ListenerFailure {
    pub listener: Listener,
    pub attempts: u32,
    pub error: String,
}

/// What happened to one published event.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub event: &'static str,
    pub succeeded: Vec<Listener>,
    pub failed: Vec<ListenerFailure>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Anything the write path can hand a committed event to.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: DomainEvent);
}

/// Runs listeners in the caller's task.
#[derive(Clone)]
pub struct EventBus {
    db: DatabaseConnection,
    time: TimeSource,
    max_attempts: u32,
    retry_delay: Duration,
}

impl EventBus {
    pub fn new(db: DatabaseConnection, time: TimeSource) -> Self {
        Self {
            db,
            time,
            max_attempts: 3,
            retry_delay: Duration::from_millis(100),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Runs every listener of `event`. Listener errors never escape; they are
    /// retried, logged on the finance channel and returned in the report.
    pub async fn dispatch(&self, event: &DomainEvent) -> DispatchReport {
        let mut report = DispatchReport {
            event: event.name(),
            succeeded: Vec::new(),
            failed: Vec::new(),
        };

        for listener in event.listeners() {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match listener.handle(&self.db, event, &self.time).await {
                    Ok(()) => {
                        debug!(event = event.name(), listener = listener.name(), "Listener completed");
                        report.succeeded.push(*listener);
                        break;
                    }
                    Err(e) if e.is_validation() || attempt >= self.max_attempts => {
                        error!(
                            target: FINANCE_TARGET,
                            event = event.name(),
                            listener = listener.name(),
                            capability = ?listener.capability(),
                            attempts = attempt,
                            error = %e,
                            "Listener failed"
                        );
                        report.failed.push(ListenerFailure {
                            listener: *listener,
                            attempts: attempt,
                            error: e.to_string(),
                        });
                        break;
                    }
                    Err(e) => {
                        warn!(
                            event = event.name(),
                            listener = listener.name(),
                            attempt,
                            error = %e,
                            "Listener failed, retrying"
                        );
                        if !self.retry_delay.is_zero() {
                            tokio::time::sleep(self.retry_delay).await;
                        }
                    }
                }
            }
        }

        report
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn publish(&self, event: DomainEvent) {
        self.dispatch(&event).await;
    }
}

/// Hands events to a background worker that dispatches them in publication
/// order. Dropping every queue handle lets the worker drain and exit.
#[derive(Clone)]
pub struct EventQueue {
    sender: mpsc::UnboundedSender<DomainEvent>,
}

impl EventQueue {
    pub fn start(bus: EventBus) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<DomainEvent>();
        let worker = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                bus.dispatch(&event).await;
            }
            debug!("Event queue closed");
        });
        (Self { sender }, worker)
    }
}

#[async_trait]
impl EventSink for EventQueue {
    async fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.sender.send(event) {
            error!(target: FINANCE_TARGET, event = e.0.name(), "Event queue is closed, event dropped");
        }
    }
}
