//! Handlers for `/escrow`: the provider wallet and withdrawals.

use crate::domain::escrow::{ProviderBalance, Withdrawal};
use crate::interfaces::http::auth::AuthUser;
use crate::interfaces::http::error::AppResult;
use crate::interfaces::http::state::AppState;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub approve: bool,
}

/// GET /escrow/balance
pub async fn balance(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<ProviderBalance>> {
    let provider_profile_id = user.provider_profile()?;
    let wallet = state.escrow().provider_balance(provider_profile_id).await?;
    Ok(Json(wallet))
}

/// POST /escrow/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Withdrawal>)> {
    let provider_profile_id = user.provider_profile()?;
    let Json(input) = payload?;
    let withdrawal = state
        .escrow()
        .request_withdrawal(provider_profile_id, input.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

/// GET /escrow/withdrawals
pub async fn withdrawals(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Vec<Withdrawal>>> {
    let provider_profile_id = user.provider_profile()?;
    let withdrawals = state.escrow().withdrawals(provider_profile_id).await?;
    Ok(Json(withdrawals))
}

/// PATCH /escrow/withdrawals/{id}/review
pub async fn review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> AppResult<Json<Withdrawal>> {
    user.require_admin()?;
    let Json(input) = payload?;
    let withdrawal = state.escrow().review_withdrawal(id, input.approve).await?;
    Ok(Json(withdrawal))
}
