//! Handlers for `/projects`.

use crate::application::coordinator::ProjectDetails;
use crate::domain::project::Project;
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
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub proposal_id: Uuid,
    pub provider_profile_id: Uuid,
    pub total_price: Decimal,
}

/// POST /projects
///
/// The caller becomes the project's client.
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ProjectDetails>)> {
    let Json(input) = payload?;
    let details = state
        .coordinator
        .create_project_from_proposal(
            input.proposal_id,
            user.user_id,
            input.provider_profile_id,
            input.total_price,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /projects/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProjectDetails>> {
    let details = state
        .coordinator
        .project_details(id, user.user_id, user.provider_profile_id)
        .await?;
    Ok(Json(details))
}

/// PATCH /projects/{id}/complete
pub async fn complete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Project>> {
    let provider_profile_id = user.provider_profile()?;
    let project = state.coordinator.mark_complete(id, provider_profile_id).await?;
    Ok(Json(project))
}

/// PATCH /projects/{id}/confirm
pub async fn confirm(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Project>> {
    let project = state.coordinator.confirm_complete(id, user.user_id).await?;
    Ok(Json(project))
}

/// PATCH /projects/{id}/cancel
pub async fn cancel(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Project>> {
    let project = state.coordinator.cancel(id, user.user_id).await?;
    Ok(Json(project))
}
