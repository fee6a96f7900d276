mod common;

use common::{harness, succeeded};
use project_settlement::application::coordinator::EventOutcome;
use project_settlement::domain::escrow::EscrowStatus;
use project_settlement::domain::money::Balance;
use project_settlement::domain::payment::{PaymentStatus, PaymentType};
use project_settlement::domain::ports::NotificationKind;
use project_settlement::domain::project::ProjectStatus;
use project_settlement::error::SettlementError;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_cancel_refunds_held_balance() {
    let h = harness();
    let project_id = h.create_project(dec!(1000)).await.project.id;
    let intent = h
        .gateway
        .create_intent(project_id, dec!(400), PaymentType::Initial, h.client)
        .await
        .unwrap();
    h.coordinator.apply_payment_event(succeeded(&intent)).await.unwrap();

    let cancelled = h.coordinator.cancel(project_id, h.client).await.unwrap();
    assert_eq!(cancelled.status, ProjectStatus::Cancelled);

    let escrow = h.escrow(project_id).await;
    assert_eq!(escrow.status, EscrowStatus::Refunded);
    assert!(escrow.balance.is_zero());
    assert_eq!(escrow.refunded_amount, Balance::new(dec!(400)));
    h.assert_escrow_reconciles(project_id).await;

    let sent = h.notifier.sent();
    let last = sent.last().unwrap();
    assert_eq!(last.kind, NotificationKind::ProjectCancelled);
    assert_eq!(last.recipient, h.provider_profile);
}

#[tokio::test]
async fn test_cancel_unfunded_project() {
    let h = harness();
    let project_id = h.create_project(dec!(1000)).await.project.id;

    h.coordinator.cancel(project_id, h.client).await.unwrap();

    let escrow = h.escrow(project_id).await;
    assert_eq!(escrow.status, EscrowStatus::Refunded);
    assert!(escrow.refunded_amount.is_zero());
}

#[tokio::test]
async fn test_cancel_after_release_fails() {
    let h = harness();
    let project_id = h.funded_project(dec!(500)).await.project.id;
    h.coordinator.mark_complete(project_id, h.provider_profile).await.unwrap();
    h.coordinator.confirm_complete(project_id, h.client).await.unwrap();

    let result = h.coordinator.cancel(project_id, h.client).await;
    assert!(matches!(result, Err(SettlementError::AlreadyReleased)));

    let escrow = h.escrow(project_id).await;
    assert_eq!(escrow.status, EscrowStatus::Released);
    assert_eq!(escrow.released_amount, Balance::new(dec!(500)));
}

#[tokio::test]
async fn test_cancel_completed_project_is_a_conflict() {
    let h = harness();
    let project_id = h.funded_project(dec!(500)).await.project.id;
    h.coordinator.mark_complete(project_id, h.provider_profile).await.unwrap();

    let result = h.coordinator.cancel(project_id, h.client).await;
    assert!(matches!(result, Err(SettlementError::InvalidState(_))));
    assert_eq!(h.escrow(project_id).await.status, EscrowStatus::Holding);
}

#[tokio::test]
async fn test_repeat_cancel_returns_current_project() {
    let h = harness();
    let project_id = h.funded_project(dec!(500)).await.project.id;

    h.coordinator.cancel(project_id, h.client).await.unwrap();
    let again = h.coordinator.cancel(project_id, h.client).await.unwrap();
    assert_eq!(again.status, ProjectStatus::Cancelled);

    let escrow = h.escrow(project_id).await;
    assert_eq!(escrow.refunded_amount, Balance::new(dec!(500)));
}

#[tokio::test]
async fn test_payment_after_cancel_is_marked_for_refund() {
    let h = harness();
    let project_id = h.create_project(dec!(1000)).await.project.id;
    let intent = h.create_intent(project_id, dec!(1000)).await;

    h.coordinator.cancel(project_id, h.client).await.unwrap();
    let outcome = h.coordinator.apply_payment_event(succeeded(&intent)).await.unwrap();
    assert_eq!(outcome, EventOutcome::LateRefunded);

    let payment = h.store.payment(intent.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);

    let details = h.details(project_id).await;
    assert_eq!(details.project.status, ProjectStatus::Cancelled);
    assert!(details.project.paid_amount.is_zero());
    assert!(details.escrow.balance.is_zero());
    h.assert_escrow_reconciles(project_id).await;

    let last = h.notifier.sent().pop().unwrap();
    assert_eq!(last.kind, NotificationKind::LatePaymentRefunded);
    assert_eq!(last.recipient, h.client);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_racing_payment_keeps_ledger_consistent() {
    for _ in 0..20 {
        let h = harness();
        let project_id = h.create_project(dec!(300)).await.project.id;
        let intent = h.create_intent(project_id, dec!(300)).await;

        let payer = h.coordinator.clone();
        let event = succeeded(&intent);
        let webhook = tokio::spawn(async move { payer.apply_payment_event(event).await });
        let canceller = h.coordinator.clone();
        let client = h.client;
        let cancel = tokio::spawn(async move { canceller.cancel(project_id, client).await });

        let outcome = webhook.await.unwrap().unwrap();
        cancel.await.unwrap().unwrap();

        let details = h.details(project_id).await;
        assert_eq!(details.project.status, ProjectStatus::Cancelled);
        assert_eq!(details.escrow.status, EscrowStatus::Refunded);
        assert!(details.escrow.balance.is_zero());
        match outcome {
            EventOutcome::Credited { .. } => {
                assert_eq!(details.escrow.refunded_amount, Balance::new(dec!(300)));
            }
            EventOutcome::LateRefunded => {
                assert!(details.escrow.refunded_amount.is_zero());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        h.assert_escrow_reconciles(project_id).await;
    }
}
