use crate::domain::ledger::{LedgerTx, retry_stale};
use crate::domain::money::{Amount, Balance};
use crate::domain::payment::{Payment, PaymentEvent, PaymentType};
use crate::domain::ports::{IntentRequest, LedgerStoreRef, PaymentProviderRef, ProviderIntent};
use crate::domain::project::ProjectStatus;
use crate::error::{Result, SettlementError};
use crate::infrastructure::signature::WebhookVerifier;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_INTENT_TIMEOUT: Duration = Duration::from_secs(10);

/// What the client needs to finish paying on the provider's side.
#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreatedIntent {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub payment_id: Uuid,
    pub amount: Amount,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
struct WebhookKind {
    #[serde(rename = "type")]
    kind: String,
}

/// Shape of the payment intent events. Other event types carry different
/// objects and are never decoded this far.
#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: IntentObject,
}

#[derive(Debug, Deserialize)]
struct IntentObject {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Wraps the external provider: intent creation on the way out, verified
/// webhook decoding on the way in.
#[derive(Clone)]
pub struct PaymentGateway {
    store: LedgerStoreRef,
    provider: PaymentProviderRef,
    verifier: WebhookVerifier,
    currency: String,
    intent_timeout: Duration,
}

impl PaymentGateway {
    pub fn new(
        store: LedgerStoreRef,
        provider: PaymentProviderRef,
        verifier: WebhookVerifier,
        currency: impl Into<String>,
        intent_timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            verifier,
            currency: currency.into().to_lowercase(),
            intent_timeout,
        }
    }

    /// Records a `PENDING` payment, then asks the provider for an intent.
    ///
    /// The payment is committed before the provider is called, so a webhook
    /// can never refer to a payment we have no row for. If the provider
    /// times out the payment stays `PENDING` without an external id and the
    /// client may simply ask again.
    pub async fn create_intent(
        &self,
        project_id: Uuid,
        amount: Decimal,
        payment_type: PaymentType,
        client_id: Uuid,
    ) -> Result<CreatedIntent> {
        let amount = Amount::new(amount)?;
        let project = self
            .store
            .project(project_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Project", project_id))?;

        if !project.is_client(client_id) {
            return Err(SettlementError::Forbidden(
                "only the project's client can pay for it".to_string(),
            ));
        }
        if project.status != ProjectStatus::PendingPayment {
            return Err(SettlementError::InvalidState(format!(
                "project {} is {:?} and is not awaiting payment",
                project.id, project.status
            )));
        }
        let outstanding = project.outstanding();
        if Balance::from(amount) > outstanding {
            return Err(SettlementError::ValidationError(format!(
                "amount {amount} exceeds the outstanding {outstanding}"
            )));
        }

        let mut payment = Payment::pending(
            project.id,
            client_id,
            amount,
            &self.currency,
            payment_type,
            Utc::now(),
        );
        let mut tx = LedgerTx::begin(self.store.as_ref());
        tx.put_payment(&mut payment);
        tx.commit().await?;

        let request = IntentRequest {
            payment_id: payment.id,
            project_id: project.id,
            amount,
            currency: payment.currency.clone(),
        };
        let intent = match tokio::time::timeout(self.intent_timeout, self.provider.create_intent(&request)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(payment_id = %payment.id, "payment provider timed out creating intent");
                return Err(SettlementError::ProviderTimeout);
            }
        };

        self.attach(payment.id, &intent).await?;
        tracing::info!(
            payment_id = %payment.id,
            %project_id,
            intent_id = %intent.id,
            %amount,
            "payment intent created"
        );

        Ok(CreatedIntent {
            client_secret: intent.client_secret,
            payment_intent_id: intent.id,
            payment_id: payment.id,
            amount,
            currency: payment.currency,
        })
    }

    // The webhook may already have resolved the payment and bound the id.
    async fn attach(&self, payment_id: Uuid, intent: &ProviderIntent) -> Result<()> {
        retry_stale("attach_intent", move || async move {
            let mut tx = LedgerTx::begin(self.store.as_ref());
            let mut payment = tx
                .payment(payment_id)
                .await?
                .ok_or_else(|| SettlementError::not_found("Payment", payment_id))?;
            if payment.external_payment_id.as_deref() == Some(intent.id.as_str()) {
                return Ok(());
            }
            payment.attach_external_id(&intent.id, Utc::now())?;
            tx.put_payment(&mut payment);
            tx.commit().await
        })
        .await
    }

    /// Verifies a webhook delivery and decodes it.
    ///
    /// Returns `None` for event types the settlement flow does not react to.
    /// Nothing in `raw_body` is looked at before the signature checks out.
    pub fn verify_webhook(&self, signature_header: &str, raw_body: &[u8]) -> Result<Option<PaymentEvent>> {
        self.verifier.verify(signature_header, raw_body, Utc::now())?;

        let WebhookKind { kind } = malformed(serde_json::from_slice(raw_body))?;
        let succeeded = match kind.as_str() {
            "payment_intent.succeeded" => true,
            "payment_intent.payment_failed" | "payment_intent.canceled" => false,
            other => {
                tracing::info!(event_type = other, "ignoring webhook event");
                return Ok(None);
            }
        };

        let envelope: WebhookEnvelope = malformed(serde_json::from_slice(raw_body))?;
        let external_id = envelope.data.object.id;
        let payment_id = envelope
            .data
            .object
            .metadata
            .get("paymentId")
            .and_then(|id| Uuid::parse_str(id).ok());

        let event = if succeeded {
            PaymentEvent::Succeeded {
                external_id,
                payment_id,
            }
        } else {
            PaymentEvent::Failed {
                external_id,
                payment_id,
            }
        };
        Ok(Some(event))
    }
}

fn malformed<T>(parsed: serde_json::Result<T>) -> Result<T> {
    parsed.map_err(|e| SettlementError::ValidationError(format!("malformed webhook payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::PaymentStatus;
    use crate::domain::ports::{LedgerStore, PaymentProvider};
    use crate::domain::project::Project;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use crate::infrastructure::provider::SandboxProvider;
    use crate::infrastructure::signature::{DEFAULT_TOLERANCE_SECS, sign};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Arc;

    const SECRET: &str = "whsec_unit";

    struct StalledProvider;

    #[async_trait]
    impl PaymentProvider for StalledProvider {
        async fn create_intent(&self, _request: &IntentRequest) -> Result<ProviderIntent> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(SettlementError::ProviderTimeout)
        }
    }

    fn gateway(store: &InMemoryLedgerStore, provider: PaymentProviderRef, timeout: Duration) -> PaymentGateway {
        PaymentGateway::new(
            Arc::new(store.clone()),
            provider,
            WebhookVerifier::new(SECRET, DEFAULT_TOLERANCE_SECS),
            "USD",
            timeout,
        )
    }

    async fn seed_project(store: &InMemoryLedgerStore, client: Uuid) -> Project {
        let mut project = Project::new(
            Uuid::new_v4(),
            client,
            Uuid::new_v4(),
            Amount::new(dec!(1000)).unwrap(),
            Utc::now(),
        );
        let mut tx = LedgerTx::begin(store);
        tx.put_project(&mut project);
        tx.commit().await.unwrap();
        project
    }

    #[tokio::test]
    async fn test_create_intent_records_pending_payment() {
        let store = InMemoryLedgerStore::new();
        let client = Uuid::new_v4();
        let project = seed_project(&store, client).await;
        let gateway = gateway(&store, Arc::new(SandboxProvider::new()), DEFAULT_INTENT_TIMEOUT);

        let created = gateway
            .create_intent(project.id, dec!(1000), PaymentType::Full, client)
            .await
            .unwrap();

        let payment = store.payment(created.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.currency, "usd");
        assert_eq!(payment.external_payment_id.as_deref(), Some(created.payment_intent_id.as_str()));
    }

    #[tokio::test]
    async fn test_create_intent_checks_caller_and_amount() {
        let store = InMemoryLedgerStore::new();
        let client = Uuid::new_v4();
        let project = seed_project(&store, client).await;
        let gateway = gateway(&store, Arc::new(SandboxProvider::new()), DEFAULT_INTENT_TIMEOUT);

        assert!(matches!(
            gateway
                .create_intent(project.id, dec!(100), PaymentType::Initial, Uuid::new_v4())
                .await,
            Err(SettlementError::Forbidden(_))
        ));
        assert!(matches!(
            gateway
                .create_intent(project.id, dec!(1000.01), PaymentType::Full, client)
                .await,
            Err(SettlementError::ValidationError(_))
        ));
        assert!(matches!(
            gateway
                .create_intent(Uuid::new_v4(), dec!(10), PaymentType::Full, client)
                .await,
            Err(SettlementError::NotFound { .. })
        ));
        assert!(store.payments_for_project(project.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_timeout_leaves_payment_pending() {
        let store = InMemoryLedgerStore::new();
        let client = Uuid::new_v4();
        let project = seed_project(&store, client).await;
        let gateway = gateway(&store, Arc::new(StalledProvider), Duration::from_millis(50));

        let result = gateway
            .create_intent(project.id, dec!(1000), PaymentType::Full, client)
            .await;
        assert!(matches!(result, Err(SettlementError::ProviderTimeout)));

        let payments = store.payments_for_project(project.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Pending);
        assert!(payments[0].external_payment_id.is_none());
    }

    #[test]
    fn test_verify_webhook_decodes_events() {
        let store = InMemoryLedgerStore::new();
        let gateway = gateway(&store, Arc::new(SandboxProvider::new()), DEFAULT_INTENT_TIMEOUT);
        let payment_id = Uuid::new_v4();
        let body = json!({
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_1", "metadata": {"paymentId": payment_id.to_string()}}}
        })
        .to_string();
        let header = sign(SECRET, Utc::now().timestamp(), body.as_bytes()).unwrap();

        let event = gateway.verify_webhook(&header, body.as_bytes()).unwrap();
        assert_eq!(
            event,
            Some(PaymentEvent::Succeeded {
                external_id: "pi_1".to_string(),
                payment_id: Some(payment_id),
            })
        );
    }

    #[test]
    fn test_verify_webhook_ignores_other_events() {
        let store = InMemoryLedgerStore::new();
        let gateway = gateway(&store, Arc::new(SandboxProvider::new()), DEFAULT_INTENT_TIMEOUT);
        let body = json!({"type": "charge.refunded", "data": {"object": {"id": "ch_1"}}}).to_string();
        let header = sign(SECRET, Utc::now().timestamp(), body.as_bytes()).unwrap();

        assert_eq!(gateway.verify_webhook(&header, body.as_bytes()).unwrap(), None);
    }

    #[test]
    fn test_verify_webhook_ignores_events_without_an_intent_object() {
        let store = InMemoryLedgerStore::new();
        let gateway = gateway(&store, Arc::new(SandboxProvider::new()), DEFAULT_INTENT_TIMEOUT);
        let body = json!({
            "type": "balance.available",
            "data": {"object": {"object": "balance", "available": []}}
        })
        .to_string();
        let header = sign(SECRET, Utc::now().timestamp(), body.as_bytes()).unwrap();

        assert_eq!(gateway.verify_webhook(&header, body.as_bytes()).unwrap(), None);
    }

    #[test]
    fn test_verify_webhook_rejects_intent_event_without_id() {
        let store = InMemoryLedgerStore::new();
        let gateway = gateway(&store, Arc::new(SandboxProvider::new()), DEFAULT_INTENT_TIMEOUT);
        let body = json!({"type": "payment_intent.succeeded", "data": {"object": {}}}).to_string();
        let header = sign(SECRET, Utc::now().timestamp(), body.as_bytes()).unwrap();

        assert!(matches!(
            gateway.verify_webhook(&header, body.as_bytes()),
            Err(SettlementError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_create_intent_rejects_fractional_cents() {
        let store = InMemoryLedgerStore::new();
        let client = Uuid::new_v4();
        let project = seed_project(&store, client).await;
        let provider = Arc::new(SandboxProvider::new());
        let gateway = gateway(&store, provider.clone(), DEFAULT_INTENT_TIMEOUT);

        assert!(matches!(
            gateway
                .create_intent(project.id, dec!(10.005), PaymentType::Initial, client)
                .await,
            Err(SettlementError::ValidationError(_))
        ));
        assert!(provider.issued().is_empty());
        assert!(store.payments_for_project(project.id).await.unwrap().is_empty());
    }

    #[test]
    fn test_verify_webhook_rejects_bad_signature() {
        let store = InMemoryLedgerStore::new();
        let gateway = gateway(&store, Arc::new(SandboxProvider::new()), DEFAULT_INTENT_TIMEOUT);
        let body = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;
        let header = sign("whsec_forged", Utc::now().timestamp(), body).unwrap();

        assert!(matches!(
            gateway.verify_webhook(&header, body),
            Err(SettlementError::SignatureInvalid(_))
        ));
    }
}
