use crate::domain::money::Amount;
use crate::domain::ports::{IntentRequest, PaymentProvider, ProviderIntent};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use std::sync::Mutex;
use uuid::Uuid;

pub const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.stripe.com";

/// Converts a decimal amount to the provider's integer minor units (cents).
/// Converts to provider minor units. The charged value must equal the
/// credited value exactly, so fractional cents are an error, never rounded.
pub fn to_minor_units(amount: Amount) -> Result<i64> {
    let out_of_range =
        || SettlementError::ValidationError(format!("amount {amount} is out of range"));
    let minor = amount
        .value()
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(out_of_range)?;
    if !minor.fract().is_zero() {
        return Err(SettlementError::ValidationError(format!(
            "amount {amount} has fractional cents"
        )));
    }
    minor.to_i64().ok_or_else(out_of_range)
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: String,
}

/// Creates payment intents through the provider's HTTP API.
pub struct HttpPaymentProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn form(request: &IntentRequest) -> Result<Vec<(&'static str, String)>> {
        Ok(vec![
            ("amount", to_minor_units(request.amount)?.to_string()),
            ("currency", request.currency.clone()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("metadata[paymentId]", request.payment_id.to_string()),
            ("metadata[projectId]", request.project_id.to_string()),
        ])
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn create_intent(&self, request: &IntentRequest) -> Result<ProviderIntent> {
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.api_key)
            // Retrying the same payment never creates a second intent.
            .header("Idempotency-Key", request.payment_id.to_string())
            .form(&Self::form(request)?)
            .send()
            .await
            .map_err(|e| SettlementError::ProviderError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SettlementError::ProviderError(format!(
                "intent creation failed with {status}: {body}"
            )));
        }

        let intent: IntentResponse = response
            .json()
            .await
            .map_err(|e| SettlementError::ProviderError(e.to_string()))?;

        Ok(ProviderIntent {
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }
}

/// An in-process provider for local runs and tests.
///
/// Every call succeeds with a fresh `pi_sandbox_*` intent; the requests are
/// kept so callers can inspect what was sent.
#[derive(Default)]
pub struct SandboxProvider {
    issued: Mutex<Vec<(IntentRequest, ProviderIntent)>>,
}

impl SandboxProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> Vec<(IntentRequest, ProviderIntent)> {
        self.issued
            .lock()
            .map(|issued| issued.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PaymentProvider for SandboxProvider {
    async fn create_intent(&self, request: &IntentRequest) -> Result<ProviderIntent> {
        let id = format!("pi_sandbox_{}", Uuid::new_v4().simple());
        let intent = ProviderIntent {
            client_secret: format!("{id}_secret_{}", Uuid::new_v4().simple()),
            id,
        };
        if let Ok(mut issued) = self.issued.lock() {
            issued.push((request.clone(), intent.clone()));
        }
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::MAX_AMOUNT;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal) -> IntentRequest {
        IntentRequest {
            payment_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            amount: Amount::new(amount).unwrap(),
            currency: "usd".to_string(),
        }
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(to_minor_units(Amount::new(dec!(1000)).unwrap()).unwrap(), 100_000);
        assert_eq!(to_minor_units(Amount::new(dec!(12.34)).unwrap()).unwrap(), 1234);
        assert_eq!(to_minor_units(Amount::new(dec!(0.01)).unwrap()).unwrap(), 1);
    }

    #[test]
    fn test_minor_units_at_the_amount_ceiling() {
        let max = Amount::new(MAX_AMOUNT).unwrap();
        assert_eq!(to_minor_units(max).unwrap(), 100_000_000_000);
    }

    #[test]
    fn test_form_carries_correlation_metadata() {
        let req = request(dec!(25.50));
        let form = HttpPaymentProvider::form(&req).unwrap();
        assert!(form.contains(&("amount", "2550".to_string())));
        assert!(form.contains(&("metadata[paymentId]", req.payment_id.to_string())));
    }

    #[tokio::test]
    async fn test_sandbox_issues_unique_intents() {
        let provider = SandboxProvider::new();
        let a = provider.create_intent(&request(dec!(10))).await.unwrap();
        let b = provider.create_intent(&request(dec!(10))).await.unwrap();

        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("pi_sandbox_"));
        assert!(a.client_secret.starts_with(&a.id));
        assert_eq!(provider.issued().len(), 2);
    }
}
