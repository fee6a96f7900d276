use super::escrow::{Escrow, ProviderBalance, Withdrawal};
use super::money::Amount;
use super::payment::{Payment, PaymentStatus};
use super::project::Project;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// A single staged write against the ledger.
///
/// Every record carries the version it will have once stored. A store
/// accepts the write only if the currently stored version is exactly one
/// less (or the record is absent and the version is 1); otherwise the whole
/// commit fails with `StaleWrite`.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerWrite {
    Project(Project),
    Escrow(Escrow),
    Payment(Payment),
    ProviderBalance(ProviderBalance),
    Withdrawal(Withdrawal),
}

/// Durable storage for projects, escrows, payments and provider wallets.
///
/// Reads return the last committed state. `commit` applies a batch
/// atomically: either every write lands or none does. Stores also enforce
/// the unique indexes (one project per proposal, one escrow per project,
/// one payment per external payment id) and report violations as
/// `AlreadyExists`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn project(&self, id: Uuid) -> Result<Option<Project>>;
    async fn project_by_proposal(&self, proposal_id: Uuid) -> Result<Option<Project>>;
    async fn escrow(&self, id: Uuid) -> Result<Option<Escrow>>;
    async fn escrow_for_project(&self, project_id: Uuid) -> Result<Option<Escrow>>;
    async fn payment(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn payment_by_external_id(&self, external_id: &str) -> Result<Option<Payment>>;
    async fn payments_for_project(&self, project_id: Uuid) -> Result<Vec<Payment>>;
    async fn payments_with_status(&self, status: PaymentStatus) -> Result<Vec<Payment>>;
    async fn provider_balance(&self, provider_profile_id: Uuid)
    -> Result<Option<ProviderBalance>>;
    async fn withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>>;
    async fn withdrawals_for_provider(&self, provider_profile_id: Uuid)
    -> Result<Vec<Withdrawal>>;
    async fn commit(&self, writes: Vec<LedgerWrite>) -> Result<()>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;

#[derive(Debug, Clone, PartialEq)]
pub struct IntentRequest {
    pub payment_id: Uuid,
    pub project_id: Uuid,
    pub amount: Amount,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderIntent {
    pub id: String,
    pub client_secret: String,
}

/// The external payment provider's intent API.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_intent(&self, request: &IntentRequest) -> Result<ProviderIntent>;
}

pub type PaymentProviderRef = Arc<dyn PaymentProvider>;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentReceived,
    PaymentFailed,
    ProjectStarted,
    ProjectCompleted,
    ProjectConfirmed,
    ProjectCancelled,
    LatePaymentRefunded,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// A user id for clients, a provider profile id for providers.
    pub recipient: Uuid,
    pub project_id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
}

/// Outbound status-change delivery. Best effort: callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

pub type NotifierRef = Arc<dyn Notifier>;
