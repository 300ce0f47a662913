//! Reference API endpoints
//!
//! - GET /api/references - List references, optionally by `?category=`
//! - POST /api/references - Create a reference
//! - PUT|DELETE /api/references/{id}
//! - POST /api/references/{id}/click - Count an outbound click
//! - GET /api/references/categories - Categories in use

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::non_blank;
use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::{CreateReferenceInput, Reference, UpdateReferenceInput};

#[derive(Debug, Default, Deserialize)]
pub struct ListReferencesQuery {
    pub category: Option<String>,
}

/// Build the references router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_references).post(create_reference))
        .route("/categories", get(list_categories))
        .route("/{id}", put(update_reference).delete(delete_reference))
        .route("/{id}/click", post(record_click))
}

/// GET /api/references
pub async fn list_references(
    State(state): State<AppState>,
    Query(query): Query<ListReferencesQuery>,
) -> Result<Json<Vec<Reference>>, ApiError> {
    let category = non_blank(query.category);
    Ok(Json(state.reference_service.list(category.as_deref()).await?))
}

/// POST /api/references
pub async fn create_reference(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(input): ApiJson<CreateReferenceInput>,
) -> Result<(StatusCode, Json<Reference>), ApiError> {
    let reference = state.reference_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(reference)))
}

/// PUT /api/references/{id}
pub async fn update_reference(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<UpdateReferenceInput>,
) -> Result<Json<Reference>, ApiError> {
    Ok(Json(state.reference_service.update(&user, id, input).await?))
}

/// DELETE /api/references/{id}
pub async fn delete_reference(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.reference_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/references/{id}/click
pub async fn record_click(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.reference_service.record_click(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/references/categories
pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.reference_service.categories().await?))
}
