//! Gallery API endpoints
//!
//! - GET /api/gallery - List items, filtered by tag, category or author
//! - POST /api/gallery - Create an item
//! - GET|PUT|DELETE /api/gallery/{id}
//! - POST /api/gallery/analyze - Analyze an image URL, or re-analyze an item
//! - POST /api/gallery/migrate - Backfill analysis for unanalyzed items
//! - GET /api/gallery/{id}/similar - Items with the closest embeddings

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::analysis::{AnalysisResult, ImageCategory};
use crate::api::common::{non_blank, PagedResponse, PaginationQuery};
use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::{
    CreateGalleryItemInput, GalleryFilter, GalleryItem, MigrationReport, SimilarItem,
    UpdateGalleryItemInput,
};
use crate::services::gallery::MAX_MIGRATION_BATCH;

const DEFAULT_SIMILAR_LIMIT: usize = 12;
const MAX_SIMILAR_LIMIT: usize = 50;

/// Filters for listing gallery items
#[derive(Debug, Default, Deserialize)]
pub struct ListGalleryQuery {
    pub tag: Option<String>,
    pub category: Option<String>,
    pub author_id: Option<i64>,
}

/// Either a URL to analyze without storing, or an item to re-analyze
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub image_url: Option<String>,
    pub id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AnalyzeResponse {
    Item(GalleryItem),
    Result(AnalysisResult),
}

#[derive(Debug, Deserialize)]
pub struct MigrateRequest {
    #[serde(default = "default_migrate_limit")]
    pub limit: i64,
}

fn default_migrate_limit() -> i64 {
    MAX_MIGRATION_BATCH
}

#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    pub limit: Option<usize>,
}

/// Build the gallery router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/analyze", post(analyze))
        .route("/migrate", post(migrate))
        .route("/{id}", get(get_item).put(update_item).delete(delete_item))
        .route("/{id}/similar", get(similar_items))
}

/// GET /api/gallery
pub async fn list_items(
    State(state): State<AppState>,
    Query(page): Query<PaginationQuery>,
    Query(query): Query<ListGalleryQuery>,
) -> Result<Json<PagedResponse<GalleryItem>>, ApiError> {
    let category = match non_blank(query.category) {
        Some(category) => Some(
            ImageCategory::from_str(&category)
                .map_err(|_| ApiError::validation_error(format!("Invalid category: {}", category)))?,
        ),
        None => None,
    };
    let filter = GalleryFilter {
        tag: non_blank(query.tag),
        category,
        author_id: query.author_id,
    };
    let result = state.gallery_service.list(&filter, &page.params()).await?;
    Ok(Json(result.into()))
}

/// POST /api/gallery
pub async fn create_item(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(input): ApiJson<CreateGalleryItemInput>,
) -> Result<(StatusCode, Json<GalleryItem>), ApiError> {
    let item = state.gallery_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /api/gallery/{id}
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<GalleryItem>, ApiError> {
    Ok(Json(state.gallery_service.get(id).await?))
}

/// PUT /api/gallery/{id}
pub async fn update_item(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<UpdateGalleryItemInput>,
) -> Result<Json<GalleryItem>, ApiError> {
    Ok(Json(state.gallery_service.update(&user, id, input).await?))
}

/// DELETE /api/gallery/{id}
pub async fn delete_item(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.gallery_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/gallery/analyze
pub async fn analyze(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(request): ApiJson<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    if let Some(id) = request.id {
        let item = state.gallery_service.analyze_item(&user, id).await?;
        return Ok(Json(AnalyzeResponse::Item(item)));
    }

    let image_url = request
        .image_url
        .ok_or_else(|| ApiError::validation_error("Either image_url or id is required"))?;
    if !crate::permissions::can_create_content(user.role) {
        return Err(ApiError::forbidden("Cannot analyze images"));
    }
    let result = state.gallery_service.analyze_url(&image_url).await?;
    Ok(Json(AnalyzeResponse::Result(result)))
}

/// POST /api/gallery/migrate
pub async fn migrate(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(request): ApiJson<MigrateRequest>,
) -> Result<Json<MigrationReport>, ApiError> {
    Ok(Json(state.gallery_service.migrate(&user, request.limit).await?))
}

/// GET /api/gallery/{id}/similar
pub async fn similar_items(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<SimilarQuery>,
) -> Result<Json<Vec<SimilarItem>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SIMILAR_LIMIT)
        .clamp(1, MAX_SIMILAR_LIMIT);
    Ok(Json(state.gallery_service.similar(id, limit).await?))
}
