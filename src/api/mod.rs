//! API layer - HTTP handlers and routing
//!
//! JSON endpoints under `/api`, the public pages and uploaded files:
//! - Gallery, post, reference, banner and user endpoints
//! - Document preview and merge helpers for the editor
//! - Image uploads
//!
//! Callers are identified by the user id the fronting auth service puts in
//! the configured header (see `middleware::resolve_user`).

pub mod banners;
pub mod common;
pub mod documents;
pub mod gallery;
pub mod middleware;
pub mod posts;
pub mod references;
pub mod upload;
pub mod users;

use anyhow::Context;
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, AuthenticatedUser};

use crate::analysis::ImageAnalyzer;
use crate::cache::Cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxBannerRepository, SqlxGalleryRepository, SqlxPostRepository, SqlxReferenceRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{BannerService, GalleryService, PostService, ReferenceService, UserService};
use crate::storage::ObjectStorage;
use crate::web::{self, Templates};

/// Wire repositories, services and templates into the shared state
pub fn build_state(
    config: &Config,
    pool: DynDatabasePool,
    cache: Arc<Cache>,
    storage: Arc<dyn ObjectStorage>,
    analyzer: Option<Arc<ImageAnalyzer>>,
) -> anyhow::Result<AppState> {
    let user_header = HeaderName::from_bytes(config.auth.user_header.trim().to_lowercase().as_bytes())
        .with_context(|| format!("Invalid identity header name: {}", config.auth.user_header))?;
    let templates = Templates::load().context("Failed to load page templates")?;

    let user_repo = SqlxUserRepository::boxed(pool.clone());

    Ok(AppState {
        user_service: Arc::new(UserService::new(user_repo.clone())),
        post_service: Arc::new(PostService::new(
            SqlxPostRepository::boxed(pool.clone()),
            user_repo.clone(),
            cache.clone(),
        )),
        gallery_service: Arc::new(GalleryService::new(
            SqlxGalleryRepository::boxed(pool.clone()),
            user_repo,
            storage.clone(),
            analyzer,
        )),
        reference_service: Arc::new(ReferenceService::new(SqlxReferenceRepository::boxed(
            pool.clone(),
        ))),
        banner_service: Arc::new(BannerService::new(SqlxBannerRepository::boxed(pool), cache)),
        storage,
        templates: Arc::new(templates),
        user_header,
    })
}

/// Build the API router (`/api/...`)
pub fn build_api_router(state: AppState, max_file_size: u64) -> Router<AppState> {
    Router::new()
        .nest("/gallery", gallery::router())
        .nest("/posts", posts::router())
        .route("/me/scraps", get(posts::list_my_scraps))
        .nest("/references", references::router())
        .nest("/banners", banners::router())
        .nest("/users", users::router())
        .nest("/documents", documents::router())
        .nest("/upload", upload::router(max_file_size))
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::resolve_user,
        ))
}

fn cors_layer(origin: &str, user_header: HeaderName) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, user_header]);

    if origin.trim() == "*" {
        return cors.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin, "Invalid CORS origin, cross-origin requests disabled");
            cors
        }
    }
}

/// Build the full application router
pub fn build_router(state: AppState, config: &Config) -> Router {
    let cors = cors_layer(&config.server.cors_origin, state.user_header.clone());
    let uploads_path = format!("/{}", config.storage.public_url.trim_matches('/'));

    Router::new()
        .nest("/api", build_api_router(state.clone(), config.storage.max_file_size))
        .merge(web::router())
        .nest_service(&uploads_path, ServeDir::new(&config.storage.path))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::{png_bytes, FakeFetcher, FakeModel};
    use crate::cache::MemoryCache;
    use crate::config::AiConfig;
    use crate::db::{create_test_pool, migrations};
    use crate::storage::LocalStorage;
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    const IMAGE_URL: &str = "https://images.example.com/ramen.png";

    struct TestApp {
        server: TestServer,
        _dir: TempDir,
    }

    async fn setup() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.path = dir.path().to_path_buf();

        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();

        let analyzer = ImageAnalyzer::new(
            Arc::new(FakeModel::food()),
            Arc::new(FakeFetcher::default().with(IMAGE_URL, png_bytes(2048))),
            &AiConfig::default(),
        );
        let state = build_state(
            &config,
            pool,
            Arc::new(Cache::Memory(MemoryCache::new())),
            Arc::new(LocalStorage::new(&config.storage)),
            Some(Arc::new(analyzer)),
        )
        .unwrap();

        TestApp {
            server: TestServer::new(build_router(state, &config)).unwrap(),
            _dir: dir,
        }
    }

    fn as_user(id: i64) -> (HeaderName, HeaderValue) {
        (HeaderName::from_static("x-user-id"), HeaderValue::from(id))
    }

    /// Bootstrap an admin (id 1) and an editor (id 2)
    async fn seed_users(server: &TestServer) {
        let response = server
            .post("/api/users")
            .json(&json!({ "email": "admin@example.com", "username": "admin" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json::<Value>()["role"], "admin");

        let (name, value) = as_user(1);
        server
            .post("/api/users")
            .add_header(name, value)
            .json(&json!({ "email": "ed@example.com", "username": "ed", "role": "editor" }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_first_user_only_bootstraps_once() {
        let app = setup().await;
        seed_users(&app.server).await;

        let response = app
            .server
            .post("/api/users")
            .json(&json!({ "email": "x@example.com", "username": "x" }))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["error"], "Authentication required");

        let (name, value) = as_user(2);
        let response = app.server.get("/api/users/me").add_header(name, value).await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["username"], "ed");
    }

    #[tokio::test]
    async fn test_unknown_identity_is_unauthorized() {
        let app = setup().await;
        seed_users(&app.server).await;

        let (name, value) = as_user(99);
        app.server
            .post("/api/posts")
            .add_header(name, value)
            .json(&json!({ "title": "Hello" }))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_post_lifecycle() {
        let app = setup().await;
        seed_users(&app.server).await;

        let body = json!({
            "title": "Hello World",
            "content": {
                "type": "doc",
                "content": [
                    { "type": "paragraph", "content": [{ "type": "text", "text": "First words" }] },
                    { "type": "image", "attrs": { "src": "/uploads/cover.png" } }
                ]
            }
        });
        let (name, value) = as_user(2);
        let response = app
            .server
            .post("/api/posts")
            .add_header(name.clone(), value.clone())
            .json(&body)
            .await;
        response.assert_status(StatusCode::CREATED);
        let post = response.json::<Value>();
        assert_eq!(post["slug"], "hello-world");
        assert_eq!(post["status"], "draft");
        assert_eq!(post["thumbnail"], "/uploads/cover.png");
        let id = post["id"].as_i64().unwrap();

        // Same title, same slug
        app.server
            .post("/api/posts")
            .add_header(name.clone(), value.clone())
            .json(&body)
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        // Drafts stay hidden from the public
        app.server
            .get(&format!("/api/posts/{}", id))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.server
            .get("/api/posts/slug/hello-world")
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let response = app
            .server
            .post(&format!("/api/posts/{}/publish", id))
            .add_header(name.clone(), value.clone())
            .await;
        response.assert_status_ok();
        let published_at = response.json::<Value>()["published_at"].clone();
        assert!(published_at.is_string());

        let response = app.server.get("/api/posts/slug/hello-world").await;
        response.assert_status_ok();
        assert!(response.json::<Value>()["content_html"]
            .as_str()
            .unwrap()
            .contains("First words"));

        let list = app.server.get("/api/posts").await.json::<Value>();
        assert_eq!(list["total"], 1);

        let response = app
            .server
            .post(&format!("/api/posts/{}/scrap", id))
            .add_header(name.clone(), value.clone())
            .await;
        response.assert_status_ok();
        assert_eq!(
            response.json::<Value>(),
            json!({ "scrapped": true, "scrap_count": 1 })
        );
        let scraps = app
            .server
            .get("/api/me/scraps")
            .add_header(name.clone(), value.clone())
            .await
            .json::<Value>();
        assert_eq!(scraps["items"][0]["id"], id);

        app.server
            .delete(&format!("/api/posts/{}", id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_readers_cannot_reach_drafts_through_scraps() {
        let app = setup().await;
        seed_users(&app.server).await;

        let (admin, admin_id) = as_user(1);
        app.server
            .post("/api/users")
            .add_header(admin, admin_id)
            .json(&json!({ "email": "reader@example.com", "username": "reader" }))
            .await
            .assert_status(StatusCode::CREATED);

        let (editor, editor_id) = as_user(2);
        let draft = app
            .server
            .post("/api/posts")
            .add_header(editor, editor_id)
            .json(&json!({ "title": "Secret draft" }))
            .await
            .json::<Value>();
        let id = draft["id"].as_i64().unwrap();

        let (reader, reader_id) = as_user(3);
        app.server
            .post(&format!("/api/posts/{}/scrap", id))
            .add_header(reader.clone(), reader_id.clone())
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.server
            .post(&format!("/api/posts/{}/view", id))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let scraps = app
            .server
            .get("/api/me/scraps")
            .add_header(reader, reader_id)
            .await
            .json::<Value>();
        assert_eq!(scraps["total"], 0);
    }

    #[tokio::test]
    async fn test_gallery_analysis_and_similarity() {
        let app = setup().await;
        seed_users(&app.server).await;
        let (name, value) = as_user(2);

        let response = app
            .server
            .post("/api/gallery/analyze")
            .add_header(name.clone(), value.clone())
            .json(&json!({ "image_url": IMAGE_URL }))
            .await;
        response.assert_status_ok();
        let analysis = response.json::<Value>();
        assert_eq!(analysis["category"], "food");
        assert_eq!(analysis["embedding_source"], "multimodal");

        let mut ids = Vec::new();
        for title in ["Ramen", "More ramen"] {
            let response = app
                .server
                .post("/api/gallery")
                .add_header(name.clone(), value.clone())
                .json(&json!({ "title": title, "image_url": IMAGE_URL, "analyze": true }))
                .await;
            response.assert_status(StatusCode::CREATED);
            let item = response.json::<Value>();
            assert_eq!(item["ai_category"], "food");
            ids.push(item["id"].as_i64().unwrap());
        }

        let similar = app
            .server
            .get(&format!("/api/gallery/{}/similar", ids[0]))
            .await
            .json::<Value>();
        assert_eq!(similar[0]["id"], ids[1]);

        let response = app
            .server
            .post("/api/gallery")
            .add_header(name, value)
            .json(&json!({ "title": "Broken", "image_url": "https://images.example.com/missing.png", "analyze": true }))
            .await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let list = app.server.get("/api/gallery?category=food").await.json::<Value>();
        assert_eq!(list["total"], 2);
    }

    #[tokio::test]
    async fn test_references_and_banners_need_site_managers() {
        let app = setup().await;
        seed_users(&app.server).await;

        let reference = json!({ "title": "Docs", "url": "https://docs.rs", "categories": ["rust"] });
        let (editor, editor_id) = as_user(2);
        app.server
            .post("/api/references")
            .add_header(editor, editor_id)
            .json(&reference)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let (admin, admin_id) = as_user(1);
        let response = app
            .server
            .post("/api/references")
            .add_header(admin.clone(), admin_id.clone())
            .json(&reference)
            .await;
        response.assert_status(StatusCode::CREATED);
        let id = response.json::<Value>()["id"].as_i64().unwrap();

        app.server
            .post(&format!("/api/references/{}/click", id))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        let categories = app.server.get("/api/references/categories").await.json::<Value>();
        assert_eq!(categories, json!(["rust"]));

        app.server
            .post("/api/banners")
            .add_header(admin.clone(), admin_id.clone())
            .json(&json!({ "title": "Spring", "image_url": "/uploads/spring.png" }))
            .await
            .assert_status(StatusCode::CREATED);
        let banners = app.server.get("/api/banners").await.json::<Value>();
        assert_eq!(banners.as_array().unwrap().len(), 1);

        app.server
            .get("/api/banners/all")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_document_merge_round() {
        let app = setup().await;
        let document = json!({
            "type": "doc",
            "content": [
                { "type": "image", "attrs": { "src": "a.png" } },
                { "type": "paragraph" },
                { "type": "image", "attrs": { "src": "b.png" } }
            ]
        });

        let armed = app
            .server
            .post("/api/documents/merge")
            .json(&json!({ "document": document, "target": [0] }))
            .await
            .json::<Value>();
        assert_eq!(armed["outcome"], "armed");

        let merged = app
            .server
            .post("/api/documents/merge")
            .json(&json!({ "document": armed["document"], "selection": armed["selection"], "target": [2] }))
            .await
            .json::<Value>();
        assert_eq!(merged["outcome"], "merged");
        let blocks = merged["document"]["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1]["type"], "imageGallery");
        assert_eq!(blocks[1]["attrs"]["images"], json!(["a.png", "b.png"]));

        let response = app
            .server
            .post("/api/documents/merge")
            .json(&json!({ "document": document, "target": [1] }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_image() {
        let app = setup().await;
        seed_users(&app.server).await;

        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(png_bytes(64)).file_name("a.png").mime_type("image/png"),
        );
        let (name, value) = as_user(2);
        let response = app
            .server
            .post("/api/upload/image")
            .add_header(name.clone(), value.clone())
            .multipart(form)
            .await;
        response.assert_status(StatusCode::CREATED);
        let stored = response.json::<Value>();
        assert!(stored["url"].as_str().unwrap().starts_with("/uploads/"));
        assert_eq!(stored["size"], 64);

        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(b"plain text".to_vec()).file_name("a.txt").mime_type("text/plain"),
        );
        app.server
            .post("/api/upload/image")
            .add_header(name, value)
            .multipart(form)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_public_pages_render() {
        let app = setup().await;
        let response = app.server.get("/").await;
        response.assert_status_ok();
        assert!(response.text().contains("Latest posts"));

        app.server
            .get("/posts/does-not-exist")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        app.server.get("/references?category=rust").await.assert_status_ok();
        app.server.get("/gallery").await.assert_status_ok();
    }
}
