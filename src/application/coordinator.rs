use super::escrow::EscrowManager;
use crate::domain::escrow::{Escrow, EscrowStatus};
use crate::domain::ledger::{LedgerTx, retry_stale};
use crate::domain::money::Amount;
use crate::domain::payment::{Payment, PaymentEvent, PaymentStatus};
use crate::domain::ports::{LedgerStoreRef, Notification, NotificationKind, NotifierRef};
use crate::domain::project::{Project, Transition};
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// What applying a payment event did to the ledger.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EventOutcome {
    /// Payment completed and the escrow credited.
    Credited { project_started: bool },
    /// Payment cancelled by a failed event.
    Cancelled,
    /// Funds arrived after the escrow had closed; the payment is marked for refund.
    LateRefunded,
    /// The payment was already resolved. Nothing changed.
    Duplicate,
    /// No payment matches the event. Nothing changed.
    Unmatched,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetails {
    pub project: Project,
    pub escrow: Escrow,
    pub payments: Vec<Payment>,
}

/// The project state machine.
///
/// Consumes verified payment events and participant actions and turns each
/// into one ledger transaction. Transitions that lose a write race are
/// re-evaluated from fresh state, which is what makes webhook replays and
/// races with cancellation safe. Notifications go out after the commit and
/// their failures never undo a settlement.
#[derive(Clone)]
pub struct SettlementCoordinator {
    store: LedgerStoreRef,
    escrow: EscrowManager,
    notifier: NotifierRef,
}

impl SettlementCoordinator {
    pub fn new(store: LedgerStoreRef, escrow: EscrowManager, notifier: NotifierRef) -> Self {
        Self {
            store,
            escrow,
            notifier,
        }
    }

    pub fn escrow(&self) -> &EscrowManager {
        &self.escrow
    }

    /// Creates the project and its empty escrow for an accepted proposal.
    pub async fn create_project_from_proposal(
        &self,
        proposal_id: Uuid,
        client_id: Uuid,
        provider_profile_id: Uuid,
        total_price: Decimal,
    ) -> Result<ProjectDetails> {
        let total_price = Amount::new(total_price)?;
        if let Some(existing) = self.store.project_by_proposal(proposal_id).await? {
            return Err(SettlementError::AlreadyExists(format!(
                "project {} for proposal {}",
                existing.id, proposal_id
            )));
        }

        let mut tx = LedgerTx::begin(self.store.as_ref());
        let mut project = Project::new(proposal_id, client_id, provider_profile_id, total_price, Utc::now());
        tx.put_project(&mut project);
        let escrow = self
            .escrow
            .create_escrow(&mut tx, project.id, project.total_price)
            .await?;
        tx.commit().await?;

        tracing::info!(project_id = %project.id, %proposal_id, total = %project.total_price, "project created");
        Ok(ProjectDetails {
            project,
            escrow,
            payments: Vec::new(),
        })
    }

    /// Applies a verified payment event exactly once.
    ///
    /// Replays of an already resolved payment and events for unknown intents
    /// succeed without touching the ledger.
    pub async fn apply_payment_event(&self, event: PaymentEvent) -> Result<EventOutcome> {
        let event = &event;
        let (outcome, notifications) =
            retry_stale("apply_payment_event", move || self.try_apply_payment_event(event)).await?;
        self.deliver(notifications).await;
        Ok(outcome)
    }

    async fn try_apply_payment_event(&self, event: &PaymentEvent) -> Result<(EventOutcome, Vec<Notification>)> {
        let external_id = event.external_id();
        let mut tx = LedgerTx::begin(self.store.as_ref());

        let Some(mut payment) = self.find_payment(&tx, event).await? else {
            tracing::warn!(%external_id, "no payment matches webhook event");
            return Ok((EventOutcome::Unmatched, Vec::new()));
        };
        if payment.is_resolved() {
            tracing::debug!(%external_id, payment_id = %payment.id, status = ?payment.status, "payment event replayed");
            return Ok((EventOutcome::Duplicate, Vec::new()));
        }

        let now = Utc::now();
        payment.attach_external_id(external_id, now)?;
        let mut project = tx.project(payment.project_id).await?;
        let mut notifications = Vec::new();

        let outcome = match event {
            PaymentEvent::Succeeded { .. } => {
                let escrow = tx.escrow_for_project(project.id).await?;
                if !escrow.is_holding() || project.status.is_terminal() {
                    payment.refund_late(now)?;
                    tx.put_payment(&mut payment);
                    tracing::warn!(
                        payment_id = %payment.id,
                        project_id = %project.id,
                        escrow_status = ?escrow.status,
                        amount = %payment.amount,
                        "payment arrived after escrow closed, refund required"
                    );
                    notifications.push(notice(
                        payment.payer_id,
                        &project,
                        NotificationKind::LatePaymentRefunded,
                        format!("Your payment of {} arrived after the project closed and will be refunded", payment.amount),
                    ));
                    EventOutcome::LateRefunded
                } else {
                    payment.complete(now)?;
                    self.escrow.credit(&mut tx, escrow.id, payment.amount).await?;
                    let project_started = project.record_payment(payment.amount, now)?;
                    tx.put_payment(&mut payment);
                    tx.put_project(&mut project);

                    tracing::info!(
                        payment_id = %payment.id,
                        project_id = %project.id,
                        amount = %payment.amount,
                        paid = %project.paid_amount,
                        project_started,
                        "payment applied"
                    );
                    notifications.push(notice(
                        payment.payer_id,
                        &project,
                        NotificationKind::PaymentReceived,
                        format!("Payment of {} received", payment.amount),
                    ));
                    if project_started {
                        for recipient in [project.client_id, project.provider_profile_id] {
                            notifications.push(notice(
                                recipient,
                                &project,
                                NotificationKind::ProjectStarted,
                                "Project is fully funded and in progress".to_string(),
                            ));
                        }
                    }
                    EventOutcome::Credited { project_started }
                }
            }
            PaymentEvent::Failed { .. } => {
                payment.cancel(now)?;
                tx.put_payment(&mut payment);
                tracing::info!(payment_id = %payment.id, project_id = %project.id, "payment failed");
                notifications.push(notice(
                    payment.payer_id,
                    &project,
                    NotificationKind::PaymentFailed,
                    format!("Payment of {} failed", payment.amount),
                ));
                EventOutcome::Cancelled
            }
        };

        tx.commit().await?;
        Ok((outcome, notifications))
    }

    // Falls back to the correlation id when the event outran the intent attach.
    async fn find_payment(&self, tx: &LedgerTx<'_>, event: &PaymentEvent) -> Result<Option<Payment>> {
        if let Some(payment) = tx.payment_by_external_id(event.external_id()).await? {
            return Ok(Some(payment));
        }
        let Some(payment_id) = event.payment_id() else {
            return Ok(None);
        };
        match tx.payment(payment_id).await? {
            Some(payment)
                if payment
                    .external_payment_id
                    .as_deref()
                    .is_some_and(|bound| bound != event.external_id()) =>
            {
                tracing::warn!(
                    %payment_id,
                    external_id = event.external_id(),
                    "event correlation id points at a payment bound to another intent"
                );
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// The provider declares the work delivered.
    pub async fn mark_complete(&self, project_id: Uuid, provider_profile_id: Uuid) -> Result<Project> {
        let (project, transition) = retry_stale("mark_complete", move || async move {
            let mut tx = LedgerTx::begin(self.store.as_ref());
            let mut project = tx.project(project_id).await?;
            if !project.is_provider(provider_profile_id) {
                return Err(SettlementError::Forbidden(
                    "only the project's provider can mark it complete".to_string(),
                ));
            }
            let transition = project.mark_complete(Utc::now())?;
            if transition == Transition::Applied {
                tx.put_project(&mut project);
                tx.commit().await?;
            }
            Ok((project, transition))
        })
        .await?;

        if transition == Transition::Applied {
            tracing::info!(%project_id, "project marked complete");
            self.deliver(vec![notice(
                project.client_id,
                &project,
                NotificationKind::ProjectCompleted,
                "The provider marked the project complete".to_string(),
            )])
            .await;
        }
        Ok(project)
    }

    /// The client accepts the delivery; the escrow is released to the provider.
    pub async fn confirm_complete(&self, project_id: Uuid, client_id: Uuid) -> Result<Project> {
        let (project, transition) = retry_stale("confirm_complete", move || async move {
            let mut tx = LedgerTx::begin(self.store.as_ref());
            let mut project = tx.project(project_id).await?;
            if !project.is_client(client_id) {
                return Err(SettlementError::Forbidden(
                    "only the project's client can confirm completion".to_string(),
                ));
            }
            let transition = project.confirm(Utc::now())?;
            if transition == Transition::Applied {
                let escrow = tx.escrow_for_project(project.id).await?;
                self.escrow
                    .release(&mut tx, escrow.id, project.provider_profile_id)
                    .await?;
                tx.put_project(&mut project);
                tx.commit().await?;
            }
            Ok((project, transition))
        })
        .await?;

        if transition == Transition::Applied {
            tracing::info!(%project_id, "project confirmed");
            self.deliver(vec![notice(
                project.provider_profile_id,
                &project,
                NotificationKind::ProjectConfirmed,
                "The client confirmed completion and the escrow was released".to_string(),
            )])
            .await;
        }
        Ok(project)
    }

    /// The client cancels an unfinished project; any held funds are refunded.
    pub async fn cancel(&self, project_id: Uuid, client_id: Uuid) -> Result<Project> {
        let (project, transition) = retry_stale("cancel", move || async move {
            let mut tx = LedgerTx::begin(self.store.as_ref());
            let mut project = tx.project(project_id).await?;
            if !project.is_client(client_id) {
                return Err(SettlementError::Forbidden(
                    "only the project's client can cancel it".to_string(),
                ));
            }
            let escrow = tx.escrow_for_project(project.id).await?;
            if escrow.status == EscrowStatus::Released {
                return Err(SettlementError::AlreadyReleased);
            }
            let transition = project.cancel(Utc::now())?;
            if transition == Transition::Applied {
                if escrow.is_holding() {
                    self.escrow.refund(&mut tx, escrow.id).await?;
                }
                tx.put_project(&mut project);
                tx.commit().await?;
            }
            Ok((project, transition))
        })
        .await?;

        if transition == Transition::Applied {
            tracing::info!(%project_id, "project cancelled");
            self.deliver(vec![notice(
                project.provider_profile_id,
                &project,
                NotificationKind::ProjectCancelled,
                "The client cancelled the project".to_string(),
            )])
            .await;
        }
        Ok(project)
    }

    /// Project, escrow and payments, visible to the project's two participants.
    pub async fn project_details(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        provider_profile_id: Option<Uuid>,
    ) -> Result<ProjectDetails> {
        let project = self
            .store
            .project(project_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Project", project_id))?;
        let is_participant =
            project.is_client(user_id) || provider_profile_id.is_some_and(|id| project.is_provider(id));
        if !is_participant {
            return Err(SettlementError::Forbidden(
                "only the project's participants can view it".to_string(),
            ));
        }

        let escrow = self
            .store
            .escrow_for_project(project_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Escrow for project", project_id))?;
        let payments = self.store.payments_for_project(project_id).await?;
        Ok(ProjectDetails {
            project,
            escrow,
            payments,
        })
    }

    /// Payments still `PENDING` that were created before `cutoff`.
    pub async fn pending_payments_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>> {
        let mut payments = self.store.payments_with_status(PaymentStatus::Pending).await?;
        payments.retain(|p| p.created_at < cutoff);
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn deliver(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            let recipient = notification.recipient;
            let kind = notification.kind;
            if let Err(e) = self.notifier.notify(notification).await {
                tracing::warn!(%recipient, ?kind, error = %e, "notification delivery failed");
            }
        }
    }
}

fn notice(recipient: Uuid, project: &Project, kind: NotificationKind, message: String) -> Notification {
    Notification {
        recipient,
        project_id: project.id,
        kind,
        message,
    }
}
