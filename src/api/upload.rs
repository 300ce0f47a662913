//! Upload API endpoints
//!
//! - POST /api/upload/image - Store one image from the multipart field `file`

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};

use crate::analysis::detect_mime;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::permissions;
use crate::storage::StoredObject;

/// Room for the multipart framing around the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the upload router; request bodies may carry `max_file_size` bytes
pub fn router(max_file_size: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/image", post(upload_image))
        .layer(DefaultBodyLimit::max(body_limit))
}

/// POST /api/upload/image
///
/// The declared content type wins; generic or missing types are sniffed
/// from the file's leading bytes.
pub async fn upload_image(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<StoredObject>), ApiError> {
    if !permissions::can_create_content(user.role) {
        return Err(ApiError::forbidden("Cannot upload files"));
    }

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let declared = field
            .content_type()
            .map(str::to_string)
            .filter(|t| !t.is_empty() && t != "application/octet-stream");

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

        let content_type = declared
            .or_else(|| detect_mime(&data).map(str::to_string))
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let stored = state.storage.put(&data, &content_type).await?;
        tracing::info!(user_id = user.id, key = %stored.key, "Uploaded image");
        return Ok((StatusCode::CREATED, Json(stored)));
    }

    Err(ApiError::validation_error("No file provided"))
}
