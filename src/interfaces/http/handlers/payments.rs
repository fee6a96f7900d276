//! Handlers for `/payments`.

use crate::application::gateway::CreatedIntent;
use crate::domain::payment::PaymentType;
use crate::error::SettlementError;
use crate::interfaces::http::auth::AuthUser;
use crate::interfaces::http::error::AppResult;
use crate::interfaces::http::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "provider-signature";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub project_id: Uuid,
    pub amount: Decimal,
    pub payment_type: PaymentType,
}

/// POST /payments/intent
pub async fn create_intent(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateIntentRequest>, JsonRejection>,
) -> AppResult<Json<CreatedIntent>> {
    let Json(input) = payload?;
    let created = state
        .gateway
        .create_intent(input.project_id, input.amount, input.payment_type, user.user_id)
        .await?;
    Ok(Json(created))
}

/// POST /payments/webhook
///
/// Takes the raw body: the signature covers the exact bytes the provider sent.
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> AppResult<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| SettlementError::SignatureInvalid("missing signature header".into()))?;

    if let Some(event) = state.gateway.verify_webhook(signature, &body)? {
        let outcome = state.coordinator.apply_payment_event(event).await?;
        tracing::debug!(?outcome, "webhook processed");
    }
    Ok(Json(json!({ "received": true })))
}
