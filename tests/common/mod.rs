#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use http_body_util::BodyExt;
use chrono::Utc;
use project_settlement::application::coordinator::{ProjectDetails, SettlementCoordinator};
use project_settlement::application::escrow::EscrowManager;
use project_settlement::application::gateway::{CreatedIntent, DEFAULT_INTENT_TIMEOUT, PaymentGateway};
use project_settlement::domain::escrow::Escrow;
use project_settlement::domain::payment::{PaymentEvent, PaymentStatus, PaymentType};
use project_settlement::domain::ports::{LedgerStoreRef, Notification, Notifier, NotifierRef};
use project_settlement::error::{Result, SettlementError};
use project_settlement::infrastructure::in_memory::InMemoryLedgerStore;
use project_settlement::infrastructure::provider::SandboxProvider;
use project_settlement::infrastructure::signature::{DEFAULT_TOLERANCE_SECS, WebhookVerifier, sign};
use project_settlement::interfaces::http::auth::{JwtConfig, generate_token};
use project_settlement::interfaces::http::router::{DEFAULT_REQUEST_TIMEOUT, build_router};
use project_settlement::interfaces::http::state::AppState;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const JWT_SECRET: &str = "jwt-integration-secret";

/// Keeps every notification it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Fails every delivery.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _notification: Notification) -> Result<()> {
        Err(SettlementError::ProviderError("mail relay unavailable".into()))
    }
}

pub struct Harness {
    pub store: LedgerStoreRef,
    pub provider: Arc<SandboxProvider>,
    pub notifier: Arc<RecordingNotifier>,
    pub coordinator: SettlementCoordinator,
    pub gateway: PaymentGateway,
    pub client: Uuid,
    pub provider_profile: Uuid,
}

pub fn harness() -> Harness {
    let notifier = Arc::new(RecordingNotifier::default());
    build_harness(notifier.clone(), notifier)
}

pub fn harness_with_notifier(sink: NotifierRef) -> Harness {
    build_harness(sink, Arc::new(RecordingNotifier::default()))
}

fn build_harness(sink: NotifierRef, notifier: Arc<RecordingNotifier>) -> Harness {
    let store: LedgerStoreRef = Arc::new(InMemoryLedgerStore::new());
    let provider = Arc::new(SandboxProvider::new());
    let coordinator = SettlementCoordinator::new(store.clone(), EscrowManager::new(store.clone()), sink);
    let gateway = PaymentGateway::new(
        store.clone(),
        provider.clone(),
        WebhookVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE_SECS),
        "usd",
        DEFAULT_INTENT_TIMEOUT,
    );
    Harness {
        store,
        provider,
        notifier,
        coordinator,
        gateway,
        client: Uuid::new_v4(),
        provider_profile: Uuid::new_v4(),
    }
}

impl Harness {
    pub fn app(&self) -> Router {
        let state = AppState::new(
            self.coordinator.clone(),
            self.gateway.clone(),
            JwtConfig::new(JWT_SECRET),
        );
        build_router(state, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn client_token(&self) -> String {
        token(self.client, "client", None)
    }

    pub fn provider_token(&self) -> String {
        token(Uuid::new_v4(), "provider", Some(self.provider_profile))
    }

    pub async fn create_project(&self, total: Decimal) -> ProjectDetails {
        self.coordinator
            .create_project_from_proposal(Uuid::new_v4(), self.client, self.provider_profile, total)
            .await
            .unwrap()
    }

    pub async fn create_intent(&self, project_id: Uuid, amount: Decimal) -> CreatedIntent {
        self.gateway
            .create_intent(project_id, amount, PaymentType::Full, self.client)
            .await
            .unwrap()
    }

    /// Project plus one completed full payment: the project is `IN_PROGRESS`.
    pub async fn funded_project(&self, total: Decimal) -> ProjectDetails {
        let details = self.create_project(total).await;
        let intent = self.create_intent(details.project.id, total).await;
        self.coordinator
            .apply_payment_event(succeeded(&intent))
            .await
            .unwrap();
        self.details(details.project.id).await
    }

    pub async fn details(&self, project_id: Uuid) -> ProjectDetails {
        self.coordinator
            .project_details(project_id, self.client, None)
            .await
            .unwrap()
    }

    pub async fn escrow(&self, project_id: Uuid) -> Escrow {
        self.store.escrow_for_project(project_id).await.unwrap().unwrap()
    }

    /// `balance + released + refunded` must equal the sum of completed payments.
    pub async fn assert_escrow_reconciles(&self, project_id: Uuid) {
        let escrow = self.escrow(project_id).await;
        let completed: Decimal = self
            .store
            .payments_for_project(project_id)
            .await
            .unwrap()
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed)
            .map(|p| p.amount.value())
            .sum();
        assert_eq!(
            escrow.balance.value() + escrow.released_amount.value() + escrow.refunded_amount.value(),
            completed,
            "escrow {escrow:?} does not reconcile with completed payments"
        );
    }
}

pub fn token(user_id: Uuid, role: &str, provider_profile_id: Option<Uuid>) -> String {
    generate_token(user_id, role, provider_profile_id, &JwtConfig::new(JWT_SECRET)).unwrap()
}

pub fn succeeded(intent: &CreatedIntent) -> PaymentEvent {
    PaymentEvent::Succeeded {
        external_id: intent.payment_intent_id.clone(),
        payment_id: Some(intent.payment_id),
    }
}

pub fn failed(intent: &CreatedIntent) -> PaymentEvent {
    PaymentEvent::Failed {
        external_id: intent.payment_intent_id.clone(),
        payment_id: Some(intent.payment_id),
    }
}

/// A provider webhook body for `intent`.
pub fn webhook_body(event_type: &str, intent: &CreatedIntent) -> String {
    json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "data": {
            "object": {
                "id": intent.payment_intent_id,
                "metadata": { "paymentId": intent.payment_id.to_string() }
            }
        }
    })
    .to_string()
}

pub fn signature_for(body: &str) -> String {
    sign(WEBHOOK_SECRET, Utc::now().timestamp(), body.as_bytes()).unwrap()
}

/// Sends one request through the full router.
pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

/// Posts a raw webhook body with the given signature header.
pub async fn post_webhook(app: Router, body: &str, signature: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/payments/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("provider-signature", signature);
    }
    app.oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
