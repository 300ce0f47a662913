//! User API endpoints
//!
//! - GET /api/users - List accounts (site managers)
//! - POST /api/users - Create an account; open while no account exists
//! - GET /api/users/me - The calling account
//! - PUT /api/users/{id} - Update profile fields
//! - PUT /api/users/{id}/role - Change the role
//! - DELETE /api/users/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use std::str::FromStr;

use crate::api::common::{non_blank, PagedResponse, PaginationQuery};
use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::{CreateUserInput, UpdateUserInput, User, UserRole};

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: UserRole,
}

/// Build the users router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/me", get(get_me))
        .route("/{id}", put(update_user).delete(delete_user))
        .route("/{id}/role", put(change_role))
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PaginationQuery>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<PagedResponse<User>>, ApiError> {
    let role = match non_blank(query.role) {
        Some(role) => Some(
            UserRole::from_str(&role).map_err(|e| ApiError::validation_error(e.to_string()))?,
        ),
        None => None,
    };
    let result = state.user_service.list(&user, &page.params(), role).await?;
    Ok(Json(result.into()))
}

/// POST /api/users
///
/// Without an identity this only succeeds for the very first account,
/// which becomes the admin.
pub async fn create_user(
    State(state): State<AppState>,
    actor: Option<AuthenticatedUser>,
    ApiJson(input): ApiJson<CreateUserInput>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    if actor.is_none() && !state.user_service.is_empty().await? {
        return Err(ApiError::unauthorized("Authentication required"));
    }
    let user = state
        .user_service
        .create(actor.as_ref().map(|a| &a.0), input)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/users/me
pub async fn get_me(AuthenticatedUser(user): AuthenticatedUser) -> Json<User> {
    Json(user)
}

/// PUT /api/users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<UpdateUserInput>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.update_profile(&user, id, input).await?))
}

/// PUT /api/users/{id}/role
pub async fn change_role(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    ApiJson(request): ApiJson<ChangeRoleRequest>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.change_role(&user, id, request.role).await?))
}

/// DELETE /api/users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.user_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
