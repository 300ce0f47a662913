//! Public pages
//!
//! Server-rendered HTML built with Tera. Templates are embedded in the
//! binary at compile time.
//!
//! - GET / - Live banners, latest posts and recent gallery items
//! - GET /posts/{slug} - A published post
//! - GET /gallery - Gallery grid, `?tag=` and `?page=`
//! - GET /references - Link directory, `?category=`

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{Datelike, Utc};
use rust_embed::RustEmbed;
use serde::Deserialize;
use std::error::Error as StdError;
use std::sync::Arc;
use tera::{Context as TeraContext, Tera};

use crate::api::common::non_blank;
use crate::api::middleware::AppState;
use crate::models::{GalleryFilter, ListParams};
use crate::services::{BannerServiceError, GalleryServiceError, PostServiceError, ReferenceServiceError};

const SITE_NAME: &str = "Atelier";
const HOME_POSTS: u32 = 6;
const HOME_GALLERY_ITEMS: u32 = 12;
const GALLERY_PAGE_SIZE: u32 = 24;

/// Embedded page templates
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct TemplateAssets;

/// Errors raised while building a page
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("Page not found: {0}")]
    NotFound(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// The compiled page templates
pub struct Templates {
    tera: Tera,
}

impl Templates {
    /// Compile the embedded templates
    pub fn load() -> Result<Self, WebError> {
        let mut templates: Vec<(String, String)> = Vec::new();
        for name in TemplateAssets::iter() {
            let Some(file) = TemplateAssets::get(&name) else {
                continue;
            };
            let content = String::from_utf8(file.data.into_owned())
                .map_err(|e| WebError::Template(format!("Template {} is not UTF-8: {}", name, e)))?;
            templates.push((name.to_string(), content));
        }

        // Parents before children
        templates.sort_by_key(|(name, _)| name != "base.html");

        let mut tera = Tera::default();
        for (name, content) in templates {
            tera.add_raw_template(&name, &content)
                .map_err(|e| WebError::Template(format!("Failed to add template {}: {}", name, e)))?;
        }
        tera.build_inheritance_chains()
            .map_err(|e| WebError::Template(format!("Failed to build template inheritance: {}", e)))?;

        Ok(Self { tera })
    }

    /// Render `template` with the site-wide variables added
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String, WebError> {
        let mut context = context.clone();
        context.insert("site_name", SITE_NAME);
        context.insert("year", &Utc::now().year());

        self.tera.render(template, &context).map_err(|e| {
            let mut message = format!("Failed to render '{}': {}", template, e);
            let mut source = e.source();
            while let Some(s) = source {
                message.push_str(&format!("\n  Caused by: {}", s));
                source = s.source();
            }
            WebError::Template(message)
        })
    }
}

/// Error page response; falls back to plain text when the page itself fails
pub struct PageError {
    error: WebError,
    templates: Arc<Templates>,
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.error {
            WebError::NotFound(_) => (StatusCode::NOT_FOUND, "This page does not exist."),
            WebError::Template(_) | WebError::Internal(_) => {
                tracing::error!("Page rendering failed: {}", self.error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong on our side.",
                )
            }
        };

        let mut context = TeraContext::new();
        context.insert("status", &status.as_u16());
        context.insert("message", message);
        match self.templates.render("error.html", &context) {
            Ok(html) => (status, Html(html)).into_response(),
            Err(_) => (status, message).into_response(),
        }
    }
}

impl From<PostServiceError> for WebError {
    fn from(err: PostServiceError) -> Self {
        match err {
            PostServiceError::NotFound(what) => WebError::NotFound(what),
            other => WebError::Internal(other.to_string()),
        }
    }
}

impl From<GalleryServiceError> for WebError {
    fn from(err: GalleryServiceError) -> Self {
        match err {
            GalleryServiceError::NotFound(what) => WebError::NotFound(what),
            other => WebError::Internal(other.to_string()),
        }
    }
}

impl From<ReferenceServiceError> for WebError {
    fn from(err: ReferenceServiceError) -> Self {
        WebError::Internal(err.to_string())
    }
}

impl From<BannerServiceError> for WebError {
    fn from(err: BannerServiceError) -> Self {
        WebError::Internal(err.to_string())
    }
}

type PageResult = Result<Html<String>, PageError>;

fn page(state: &AppState, template: &str, context: &TeraContext) -> PageResult {
    state
        .templates
        .render(template, context)
        .map(Html)
        .map_err(|error| PageError {
            error,
            templates: state.templates.clone(),
        })
}

fn page_error(state: &AppState, error: impl Into<WebError>) -> PageError {
    PageError {
        error: error.into(),
        templates: state.templates.clone(),
    }
}

/// Build the public pages router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/posts/{slug}", get(post_page))
        .route("/gallery", get(gallery_page))
        .route("/references", get(references_page))
}

/// GET /
pub async fn home(State(state): State<AppState>) -> PageResult {
    let banners = state
        .banner_service
        .list_active(Utc::now())
        .await
        .map_err(|e| page_error(&state, e))?;
    let posts = state
        .post_service
        .list_published(None, &ListParams::new(1, HOME_POSTS))
        .await
        .map_err(|e| page_error(&state, e))?;
    let gallery = state
        .gallery_service
        .list(&GalleryFilter::default(), &ListParams::new(1, HOME_GALLERY_ITEMS))
        .await
        .map_err(|e| page_error(&state, e))?;

    let mut context = TeraContext::new();
    context.insert("banners", &banners);
    context.insert("posts", &posts.items);
    context.insert("gallery", &gallery.items);
    page(&state, "index.html", &context)
}

/// GET /posts/{slug}
pub async fn post_page(State(state): State<AppState>, Path(slug): Path<String>) -> PageResult {
    let post = state
        .post_service
        .get_published_by_slug(&slug)
        .await
        .map_err(|e| page_error(&state, e))?;

    if let Err(e) = state.post_service.record_view(None, post.id).await {
        tracing::warn!(post_id = post.id, "Failed to record view: {}", e);
    }

    let mut context = TeraContext::new();
    context.insert("post", &post);
    page(&state, "post.html", &context)
}

#[derive(Debug, Default, Deserialize)]
pub struct GalleryPageQuery {
    pub page: Option<u32>,
    pub tag: Option<String>,
}

/// GET /gallery
pub async fn gallery_page(
    State(state): State<AppState>,
    Query(query): Query<GalleryPageQuery>,
) -> PageResult {
    let tag = non_blank(query.tag);
    let filter = GalleryFilter {
        tag: tag.clone(),
        ..GalleryFilter::default()
    };
    let params = ListParams::new(query.page.unwrap_or(1), GALLERY_PAGE_SIZE);
    let result = state
        .gallery_service
        .list(&filter, &params)
        .await
        .map_err(|e| page_error(&state, e))?;

    let mut context = TeraContext::new();
    context.insert("items", &result.items);
    context.insert("tag", &tag);
    context.insert("page", &result.page);
    context.insert("total_pages", &result.total_pages());
    page(&state, "gallery.html", &context)
}

#[derive(Debug, Default, Deserialize)]
pub struct ReferencesPageQuery {
    pub category: Option<String>,
}

/// GET /references
pub async fn references_page(
    State(state): State<AppState>,
    Query(query): Query<ReferencesPageQuery>,
) -> PageResult {
    let category = non_blank(query.category);
    let references = state
        .reference_service
        .list(category.as_deref())
        .await
        .map_err(|e| page_error(&state, e))?;
    let categories = state
        .reference_service
        .categories()
        .await
        .map_err(|e| page_error(&state, e))?;

    let mut context = TeraContext::new();
    context.insert("references", &references);
    context.insert("categories", &categories);
    context.insert("category", &category);
    page(&state, "references.html", &context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_templates_compile() {
        let templates = Templates::load().unwrap();
        let mut context = TeraContext::new();
        context.insert("status", &404);
        context.insert("message", "gone");
        let html = templates.render("error.html", &context).unwrap();
        assert!(html.contains("404"));
        assert!(html.contains(SITE_NAME));
    }

    #[test]
    fn test_references_template_escapes_titles() {
        let templates = Templates::load().unwrap();
        let mut context = TeraContext::new();
        context.insert(
            "references",
            &serde_json::json!([{
                "id": 1,
                "title": "<b>Docs</b>",
                "url": "https://docs.rs",
                "description": null,
                "logo_url": null
            }]),
        );
        context.insert("categories", &vec!["rust"]);
        context.insert("category", &Option::<String>::None);
        let html = templates.render("references.html", &context).unwrap();
        assert!(html.contains("&lt;b&gt;Docs&lt;&#x2F;b&gt;"));
        assert!(html.contains("/references?category=rust"));
    }
}
