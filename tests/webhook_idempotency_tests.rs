mod common;

use common::{harness, succeeded};
use project_settlement::application::coordinator::EventOutcome;
use project_settlement::domain::money::Balance;
use project_settlement::domain::payment::{PaymentEvent, PaymentStatus, PaymentType};
use project_settlement::domain::project::ProjectStatus;
use rand::seq::SliceRandom;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_sequential_replay_credits_once() {
    let h = harness();
    let project_id = h.create_project(dec!(1000)).await.project.id;
    let intent = h.create_intent(project_id, dec!(1000)).await;

    let first = h.coordinator.apply_payment_event(succeeded(&intent)).await.unwrap();
    assert_eq!(first, EventOutcome::Credited { project_started: true });
    for _ in 0..5 {
        let replay = h.coordinator.apply_payment_event(succeeded(&intent)).await.unwrap();
        assert_eq!(replay, EventOutcome::Duplicate);
    }

    let details = h.details(project_id).await;
    assert_eq!(details.escrow.balance, Balance::new(dec!(1000)));
    assert_eq!(details.project.paid_amount, Balance::new(dec!(1000)));
    h.assert_escrow_reconciles(project_id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_credit_once() {
    let h = harness();
    let project_id = h.create_project(dec!(1000)).await.project.id;
    let intent = h.create_intent(project_id, dec!(1000)).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let coordinator = h.coordinator.clone();
        let event = succeeded(&intent);
        handles.push(tokio::spawn(async move { coordinator.apply_payment_event(event).await }));
    }

    let mut credited = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            EventOutcome::Credited { .. } => credited += 1,
            EventOutcome::Duplicate => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(credited, 1);

    let details = h.details(project_id).await;
    assert_eq!(details.escrow.balance, Balance::new(dec!(1000)));
    assert_eq!(details.project.status, ProjectStatus::InProgress);
    let completed = details
        .payments
        .iter()
        .filter(|p| p.status == PaymentStatus::Completed)
        .count();
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn test_shuffled_replay_of_installments() {
    let h = harness();
    let project_id = h.create_project(dec!(900)).await.project.id;

    let mut events: Vec<PaymentEvent> = Vec::new();
    for _ in 0..3 {
        let intent = h
            .gateway
            .create_intent(project_id, dec!(300), PaymentType::Initial, h.client)
            .await
            .unwrap();
        // Every delivery arrives three times.
        for _ in 0..3 {
            events.push(succeeded(&intent));
        }
    }
    events.shuffle(&mut rand::thread_rng());

    for event in events {
        h.coordinator.apply_payment_event(event).await.unwrap();
    }

    let details = h.details(project_id).await;
    assert_eq!(details.escrow.balance, Balance::new(dec!(900)));
    assert_eq!(details.project.paid_amount, Balance::new(dec!(900)));
    assert_eq!(details.project.status, ProjectStatus::InProgress);
    h.assert_escrow_reconciles(project_id).await;
}

#[tokio::test]
async fn test_failure_after_success_is_ignored() {
    let h = harness();
    let project_id = h.create_project(dec!(100)).await.project.id;
    let intent = h.create_intent(project_id, dec!(100)).await;

    h.coordinator.apply_payment_event(succeeded(&intent)).await.unwrap();
    let late_failure = h
        .coordinator
        .apply_payment_event(common::failed(&intent))
        .await
        .unwrap();
    assert_eq!(late_failure, EventOutcome::Duplicate);

    let payment = h.store.payment(intent.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_correlation_id_of_other_intent_is_unmatched() {
    let h = harness();
    let project_id = h.create_project(dec!(100)).await.project.id;
    let intent = h.create_intent(project_id, dec!(100)).await;

    // The payment is already bound to the intent the sandbox created.
    let event = PaymentEvent::Succeeded {
        external_id: "pi_other".to_string(),
        payment_id: Some(intent.payment_id),
    };
    assert_eq!(
        h.coordinator.apply_payment_event(event).await.unwrap(),
        EventOutcome::Unmatched
    );
    let payment = h.store.payment(intent.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
}
