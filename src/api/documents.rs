//! Document API endpoints
//!
//! Stateless helpers for the editor:
//! - POST /api/documents/render - HTML preview, excerpt and images
//! - POST /api/documents/merge - One click of the image merge interaction
//!
//! The merge selection travels with each request and comes back in the
//! response, so every editor session carries its own.

use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, ApiJson, AppState};
use crate::document::{render_html, Document, MergeOutcome, MergeSelection};
use crate::services::post::EXCERPT_CHARS;

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub document: Document,
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub html: String,
    pub excerpt: String,
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub document: Document,
    #[serde(default)]
    pub selection: MergeSelection,
    /// Path of the clicked node
    pub target: Vec<usize>,
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub document: Document,
    pub selection: MergeSelection,
    #[serde(flatten)]
    pub outcome: MergeOutcome,
}

/// Build the documents router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/render", post(render_document))
        .route("/merge", post(merge_click))
}

/// POST /api/documents/render
pub async fn render_document(
    ApiJson(request): ApiJson<RenderRequest>,
) -> Result<Json<RenderResponse>, ApiError> {
    let document = request.document;
    document.validate()?;
    Ok(Json(RenderResponse {
        html: render_html(&document),
        excerpt: document.excerpt(EXCERPT_CHARS),
        images: document.images(),
    }))
}

/// POST /api/documents/merge
pub async fn merge_click(
    ApiJson(request): ApiJson<MergeRequest>,
) -> Result<Json<MergeResponse>, ApiError> {
    let mut document = request.document;
    let mut selection = request.selection;
    let outcome = selection.click(&mut document, &request.target)?;
    Ok(Json(MergeResponse {
        document,
        selection,
        outcome,
    }))
}
