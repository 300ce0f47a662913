//! Post API endpoints
//!
//! - GET /api/posts - Published posts, or any status for dashboard users
//! - POST /api/posts - Create a post
//! - GET /api/posts/{id} - Get a post by id
//! - PUT /api/posts/{id} - Update a post
//! - DELETE /api/posts/{id} - Delete a post
//! - GET /api/posts/slug/{slug} - Get a published post by slug
//! - POST /api/posts/{id}/publish, /unpublish - Change visibility
//! - POST /api/posts/{id}/view - Count a view
//! - POST /api/posts/{id}/scrap - Toggle the caller's bookmark
//! - GET /api/me/scraps - The caller's bookmarks

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{non_blank, PagedResponse, PaginationQuery};
use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::{CreatePostInput, Post, PostFilter, PostStatus, ScrapToggle, UpdatePostInput};
use crate::permissions;

/// Filters for listing posts
#[derive(Debug, Default, Deserialize)]
pub struct ListPostsQuery {
    /// `draft` or `published`; honoured for dashboard users only
    pub status: Option<String>,
    pub category: Option<String>,
    pub author_id: Option<i64>,
}

/// Build the posts router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts).post(create_post))
        .route("/{id}", get(get_post).put(update_post).delete(delete_post))
        .route("/slug/{slug}", get(get_post_by_slug))
        .route("/{id}/publish", post(publish_post))
        .route("/{id}/unpublish", post(unpublish_post))
        .route("/{id}/view", post(record_view))
        .route("/{id}/scrap", post(toggle_scrap))
}

fn is_dashboard_user(user: Option<&AuthenticatedUser>) -> bool {
    user.is_some_and(|u| permissions::can_access_dashboard(u.0.role))
}

/// GET /api/posts
pub async fn list_posts(
    State(state): State<AppState>,
    user: Option<AuthenticatedUser>,
    Query(page): Query<PaginationQuery>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<PagedResponse<Post>>, ApiError> {
    let params = page.params();
    let category = non_blank(query.category);

    if !is_dashboard_user(user.as_ref()) {
        let result = state
            .post_service
            .list_published(category.as_deref(), &params)
            .await?;
        return Ok(Json(result.into()));
    }

    let status = match non_blank(query.status) {
        Some(status) => Some(
            PostStatus::parse(&status)
                .ok_or_else(|| ApiError::validation_error(format!("Invalid status: {}", status)))?,
        ),
        None => None,
    };
    let filter = PostFilter {
        status,
        category,
        author_id: query.author_id,
    };
    let result = state.post_service.list(&filter, &params).await?;
    Ok(Json(result.into()))
}

/// POST /api/posts
pub async fn create_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(input): ApiJson<CreatePostInput>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let post = state.post_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /api/posts/{id}
///
/// Drafts are only visible to dashboard users.
pub async fn get_post(
    State(state): State<AppState>,
    user: Option<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<Post>, ApiError> {
    let post = state
        .post_service
        .get_visible(user.as_ref().map(|u| &u.0), id)
        .await?;
    Ok(Json(post))
}

/// GET /api/posts/slug/{slug}
pub async fn get_post_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Post>, ApiError> {
    let post = state.post_service.get_published_by_slug(&slug).await?;
    Ok(Json(post))
}

/// PUT /api/posts/{id}
pub async fn update_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<UpdatePostInput>,
) -> Result<Json<Post>, ApiError> {
    let post = state.post_service.update(&user, id, input).await?;
    Ok(Json(post))
}

/// DELETE /api/posts/{id}
pub async fn delete_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.post_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/posts/{id}/publish
pub async fn publish_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Post>, ApiError> {
    let post = state.post_service.publish(&user, id).await?;
    Ok(Json(post))
}

/// POST /api/posts/{id}/unpublish
pub async fn unpublish_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Post>, ApiError> {
    let post = state.post_service.unpublish(&user, id).await?;
    Ok(Json(post))
}

/// POST /api/posts/{id}/view
pub async fn record_view(
    State(state): State<AppState>,
    user: Option<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .post_service
        .record_view(user.as_ref().map(|u| &u.0), id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/posts/{id}/scrap
pub async fn toggle_scrap(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<ScrapToggle>, ApiError> {
    let toggle = state.post_service.toggle_scrap(&user, id).await?;
    Ok(Json(toggle))
}

/// GET /api/me/scraps
pub async fn list_my_scraps(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResponse<Post>>, ApiError> {
    let result = state.post_service.list_scraps(&user, &page.params()).await?;
    Ok(Json(result.into()))
}
