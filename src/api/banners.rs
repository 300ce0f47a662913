//! Banner API endpoints
//!
//! - GET /api/banners - Banners live right now
//! - GET /api/banners/all - Every banner, for the dashboard
//! - POST /api/banners, PUT|DELETE /api/banners/{id}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;

use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::{Banner, CreateBannerInput, UpdateBannerInput};
use crate::permissions;

/// Build the banners router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_active).post(create_banner))
        .route("/all", get(list_all))
        .route("/{id}", put(update_banner).delete(delete_banner))
}

/// GET /api/banners
pub async fn list_active(State(state): State<AppState>) -> Result<Json<Vec<Banner>>, ApiError> {
    Ok(Json(state.banner_service.list_active(Utc::now()).await?))
}

/// GET /api/banners/all
pub async fn list_all(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Banner>>, ApiError> {
    if !permissions::can_access_dashboard(user.role) {
        return Err(ApiError::forbidden("Dashboard access required"));
    }
    Ok(Json(state.banner_service.list_all().await?))
}

/// POST /api/banners
pub async fn create_banner(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(input): ApiJson<CreateBannerInput>,
) -> Result<(StatusCode, Json<Banner>), ApiError> {
    let banner = state.banner_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(banner)))
}

/// PUT /api/banners/{id}
pub async fn update_banner(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<UpdateBannerInput>,
) -> Result<Json<Banner>, ApiError> {
    Ok(Json(state.banner_service.update(&user, id, input).await?))
}

/// DELETE /api/banners/{id}
pub async fn delete_banner(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.banner_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
