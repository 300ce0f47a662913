//! API middleware
//!
//! Contains:
//! - The JSON error type every handler returns
//! - Shared application state
//! - Identity resolution from the header set by the fronting auth service

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;

use crate::document::DocumentError;
use crate::models::User;
use crate::services::{
    BannerService, BannerServiceError, GalleryService, GalleryServiceError, PostService,
    PostServiceError, ReferenceService, ReferenceServiceError, UserService, UserServiceError,
};
use crate::storage::{ObjectStorage, StorageError};
use crate::web::Templates;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub post_service: Arc<PostService>,
    pub gallery_service: Arc<GalleryService>,
    pub reference_service: Arc<ReferenceService>,
    pub banner_service: Arc<BannerService>,
    pub storage: Arc<dyn ObjectStorage>,
    pub templates: Arc<Templates>,
    /// Header carrying the caller's user id
    pub user_header: HeaderName,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Error response for API errors, serialized as `{"error": "..."}`
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            error: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Log the cause and answer with a generic 500
    fn internal(err: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", err);
        Self::internal_error("Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::DuplicateEmail(_) => ApiError::conflict(err.to_string()),
            UserServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            UserServiceError::Internal(e) => ApiError::internal(e),
        }
    }
}

impl From<PostServiceError> for ApiError {
    fn from(err: PostServiceError) -> Self {
        match err {
            PostServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            PostServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PostServiceError::DuplicateSlug(_) => ApiError::validation_error(err.to_string()),
            PostServiceError::InvalidDocument(e) => e.into(),
            PostServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            PostServiceError::Internal(e) => ApiError::internal(e),
        }
    }
}

impl From<GalleryServiceError> for ApiError {
    fn from(err: GalleryServiceError) -> Self {
        match err {
            GalleryServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            GalleryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            GalleryServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            GalleryServiceError::Analysis(e) => {
                tracing::warn!("Image analysis failed: {}", e);
                ApiError::internal_error(e.to_string())
            }
            GalleryServiceError::Internal(e) => ApiError::internal(e),
        }
    }
}

impl From<ReferenceServiceError> for ApiError {
    fn from(err: ReferenceServiceError) -> Self {
        match err {
            ReferenceServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            ReferenceServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ReferenceServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ReferenceServiceError::Internal(e) => ApiError::internal(e),
        }
    }
}

impl From<BannerServiceError> for ApiError {
    fn from(err: BannerServiceError) -> Self {
        match err {
            BannerServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            BannerServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            BannerServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            BannerServiceError::Internal(e) => ApiError::internal(e),
        }
    }
}

impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        ApiError::validation_error(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => ApiError::internal(e.into()),
            other => ApiError::validation_error(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation_error(rejection.body_text())
    }
}

/// JSON request body whose rejections use the API error shape
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// User id asserted in `header`, if present and numeric
fn asserted_user_id(headers: &HeaderMap, header: &HeaderName) -> Option<i64> {
    headers
        .get(header)?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()
}

/// Identity middleware
///
/// Resolves the asserted user id to an account and stores it in the request
/// extensions. Requests without a known id pass through anonymously; routes
/// that need a caller reject them through the `AuthenticatedUser` extractor.
pub async fn resolve_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(user_id) = asserted_user_id(request.headers(), &state.user_header) {
        match state.user_service.find(user_id).await? {
            Some(user) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            None => tracing::debug!(user_id, "Asserted user does not exist"),
        }
    }
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthenticatedUser>().cloned())
    }
}
