//! Post service
//!
//! Business logic for blog posts:
//! - Slugs generated from titles and kept unique
//! - HTML, excerpt and thumbnail derived from the document on every write
//! - Publishing keeps the first publication date
//! - Published lookups and listings are cached
//! - Bookmarks ("scraps") per user

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{PostRepository, UserRepository};
use crate::document::{render_html, Document, DocumentError};
use crate::models::{
    CreatePostInput, ListParams, PagedResult, Post, PostFilter, PostStatus, ScrapToggle,
    UpdatePostInput, User,
};
use crate::permissions::{self, Principal};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Cache TTL for a single published post
const POST_CACHE_TTL_SECS: u64 = 3600;

/// Cache TTL for published listings
const POST_LIST_CACHE_TTL_SECS: u64 = 600;

const CACHE_KEY_POST_BY_SLUG: &str = "posts:slug:";
const CACHE_KEY_POST_LIST: &str = "posts:list";
const CACHE_PATTERN_POSTS: &str = "posts:*";

/// Characters kept in the derived excerpt
pub const EXCERPT_CHARS: usize = 200;

/// Error types for post service operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Post slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(#[from] DocumentError),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Post service
pub struct PostService {
    repo: Arc<dyn PostRepository>,
    user_repo: Arc<dyn UserRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        user_repo: Arc<dyn UserRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self::with_cache_ttl(repo, user_repo, cache, Duration::from_secs(POST_CACHE_TTL_SECS))
    }

    pub fn with_cache_ttl(
        repo: Arc<dyn PostRepository>,
        user_repo: Arc<dyn UserRepository>,
        cache: Arc<Cache>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            user_repo,
            cache,
            cache_ttl,
        }
    }

    /// Create a post.
    ///
    /// # Errors
    /// - `Forbidden` unless the author may create content
    /// - `ValidationError` if the title is empty
    /// - `DuplicateSlug` if the slug is taken
    /// - `InvalidDocument` if the content does not validate
    pub async fn create(&self, author: &User, input: CreatePostInput) -> Result<Post, PostServiceError> {
        if !permissions::can_create_content(author.role) {
            return Err(PostServiceError::Forbidden("Cannot write posts".into()));
        }

        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(PostServiceError::ValidationError(
                "Title cannot be empty".into(),
            ));
        }

        let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) => normalize_slug(slug)?,
            None => slug_or_fallback(&title),
        };
        if self
            .repo
            .exists_by_slug(&slug)
            .await
            .context("Failed to check slug uniqueness")?
        {
            return Err(PostServiceError::DuplicateSlug(slug));
        }

        let content = input.content.unwrap_or_else(Document::empty);
        content.validate()?;

        let mut post = Post::new(slug, title, content, Some(author.id));
        post.category = non_blank(input.category);
        post.thumbnail = non_blank(input.thumbnail);
        derive_content(&mut post, None);

        if input.status == Some(PostStatus::Published) {
            post.status = PostStatus::Published;
            post.published_at = Some(Utc::now());
        }

        let post = self.repo.create(&post).await.context("Failed to create post")?;
        tracing::info!(post_id = post.id, slug = %post.slug, "Created post");

        if post.is_published() {
            self.invalidate_cache().await?;
        }
        Ok(post)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Post, PostServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get post by ID")?
            .ok_or_else(|| PostServiceError::NotFound(id.to_string()))
    }

    /// A post as `viewer` may see it; drafts are reported as missing to
    /// anyone outside the dashboard
    pub async fn get_visible(&self, viewer: Option<&User>, id: i64) -> Result<Post, PostServiceError> {
        let post = self.get_by_id(id).await?;
        if !post.is_published() && !viewer.is_some_and(|u| permissions::can_access_dashboard(u.role)) {
            return Err(PostServiceError::NotFound(id.to_string()));
        }
        Ok(post)
    }

    /// Published post by slug; drafts are reported as missing
    pub async fn get_published_by_slug(&self, slug: &str) -> Result<Post, PostServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_POST_BY_SLUG, slug);
        if let Ok(Some(post)) = self.cache.get::<Post>(&cache_key).await {
            return Ok(post);
        }

        let post = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get post by slug")?
            .filter(Post::is_published)
            .ok_or_else(|| PostServiceError::NotFound(slug.to_string()))?;

        let _ = self.cache.set(&cache_key, &post, self.cache_ttl).await;
        Ok(post)
    }

    /// Posts matching `filter`, any status
    pub async fn list(
        &self,
        filter: &PostFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Post>, PostServiceError> {
        let posts = self
            .repo
            .list(filter, params.offset(), params.limit())
            .await
            .context("Failed to list posts")?;
        let total = self.repo.count(filter).await.context("Failed to count posts")?;
        Ok(PagedResult::new(posts, total, params))
    }

    /// Published posts, newest first, optionally within one category
    pub async fn list_published(
        &self,
        category: Option<&str>,
        params: &ListParams,
    ) -> Result<PagedResult<Post>, PostServiceError> {
        let category = category.map(str::trim).filter(|c| !c.is_empty());
        let cache_key = format!(
            "{}:published:{}:{}:{}",
            CACHE_KEY_POST_LIST,
            category.unwrap_or("*"),
            params.page,
            params.per_page
        );
        if let Ok(Some(cached)) = self.cache.get::<PagedResult<Post>>(&cache_key).await {
            return Ok(cached);
        }

        let filter = PostFilter {
            category: category.map(str::to_string),
            ..PostFilter::published()
        };
        let result = self.list(&filter, params).await?;

        let _ = self
            .cache
            .set(&cache_key, &result, Duration::from_secs(POST_LIST_CACHE_TTL_SECS))
            .await;
        Ok(result)
    }

    /// Update a post; the publication date is left untouched and an input
    /// without changes writes nothing
    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: UpdatePostInput,
    ) -> Result<Post, PostServiceError> {
        let mut post = self.get_by_id(id).await?;
        self.check_can_modify(actor, &post).await?;
        if !input.has_changes() {
            return Ok(post);
        }

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(PostServiceError::ValidationError(
                    "Title cannot be empty".into(),
                ));
            }
            post.title = title;
        }

        if let Some(slug) = input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let slug = normalize_slug(slug)?;
            if slug != post.slug {
                if self
                    .repo
                    .exists_by_slug_excluding(&slug, post.id)
                    .await
                    .context("Failed to check slug uniqueness")?
                {
                    return Err(PostServiceError::DuplicateSlug(slug));
                }
                post.slug = slug;
            }
        }

        if input.category.is_some() {
            post.category = non_blank(input.category);
        }

        let previous_first_image = post.content.first_image();
        if let Some(content) = input.content {
            content.validate()?;
            post.content = content;
        }
        if input.thumbnail.is_some() {
            post.thumbnail = non_blank(input.thumbnail);
        }
        derive_content(&mut post, previous_first_image);

        let post = self.repo.update(&post).await.context("Failed to update post")?;
        self.invalidate_cache().await?;
        Ok(post)
    }

    /// Publish a post. The first publication date is kept on later calls.
    pub async fn publish(&self, actor: &User, id: i64) -> Result<Post, PostServiceError> {
        let mut post = self.get_by_id(id).await?;
        self.check_can_modify(actor, &post).await?;

        post.status = PostStatus::Published;
        post.published_at.get_or_insert_with(Utc::now);

        let post = self.repo.update(&post).await.context("Failed to publish post")?;
        tracing::info!(post_id = post.id, "Published post");
        self.invalidate_cache().await?;
        Ok(post)
    }

    /// Back to draft; the publication date is cleared
    pub async fn unpublish(&self, actor: &User, id: i64) -> Result<Post, PostServiceError> {
        let mut post = self.get_by_id(id).await?;
        self.check_can_modify(actor, &post).await?;

        post.status = PostStatus::Draft;
        post.published_at = None;

        let post = self.repo.update(&post).await.context("Failed to unpublish post")?;
        tracing::info!(post_id = post.id, "Unpublished post");
        self.invalidate_cache().await?;
        Ok(post)
    }

    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), PostServiceError> {
        let post = self.get_by_id(id).await?;
        self.check_can_modify(actor, &post).await?;

        self.repo.delete(id).await.context("Failed to delete post")?;
        tracing::info!(actor_id = actor.id, post_id = id, "Deleted post");
        self.invalidate_cache().await?;
        Ok(())
    }

    pub async fn record_view(&self, viewer: Option<&User>, id: i64) -> Result<(), PostServiceError> {
        self.get_visible(viewer, id).await?;
        self.repo
            .increment_view(id)
            .await
            .context("Failed to record view")?;
        Ok(())
    }

    /// Bookmark the post, or remove the bookmark when it already exists
    pub async fn toggle_scrap(&self, user: &User, post_id: i64) -> Result<ScrapToggle, PostServiceError> {
        self.get_visible(Some(user), post_id).await?;

        let scrapped = self
            .repo
            .has_scrap(user.id, post_id)
            .await
            .context("Failed to check scrap")?;
        let scrap_count = if scrapped {
            self.repo.remove_scrap(user.id, post_id).await
        } else {
            self.repo.add_scrap(user.id, post_id).await
        }
        .context("Failed to toggle scrap")?;

        Ok(ScrapToggle {
            scrapped: !scrapped,
            scrap_count,
        })
    }

    /// Bookmarked posts; drafts only show up for dashboard users
    pub async fn list_scraps(
        &self,
        user: &User,
        params: &ListParams,
    ) -> Result<PagedResult<Post>, PostServiceError> {
        let published_only = !permissions::can_access_dashboard(user.role);
        let posts = self
            .repo
            .list_scrapped_by_user(user.id, published_only, params.offset(), params.limit())
            .await
            .context("Failed to list scraps")?;
        let total = self
            .repo
            .count_scrapped_by_user(user.id, published_only)
            .await
            .context("Failed to count scraps")?;
        Ok(PagedResult::new(posts, total, params))
    }

    async fn check_can_modify(&self, actor: &User, post: &Post) -> Result<(), PostServiceError> {
        let owner_role = match post.author_id {
            Some(author_id) => self
                .user_repo
                .get_by_id(author_id)
                .await
                .context("Failed to load post author")?
                .map(|u| u.role),
            None => None,
        };
        if permissions::can_modify_content(Principal::from(actor), post.author_id, owner_role) {
            Ok(())
        } else {
            Err(PostServiceError::Forbidden(
                "Cannot modify this post".into(),
            ))
        }
    }

    async fn invalidate_cache(&self) -> Result<(), PostServiceError> {
        self.cache
            .delete_pattern(CACHE_PATTERN_POSTS)
            .await
            .context("Failed to invalidate post cache")?;
        Ok(())
    }
}

/// Refresh the fields derived from the document.
///
/// A thumbnail equal to the document's former first image follows the
/// document; an explicitly chosen one is kept.
fn derive_content(post: &mut Post, previous_first_image: Option<String>) {
    post.content_html = render_html(&post.content);
    post.excerpt = post.content.excerpt(EXCERPT_CHARS);

    let derived = match (&post.thumbnail, &previous_first_image) {
        (None, _) => true,
        (Some(current), Some(previous)) => current == previous,
        (Some(_), None) => false,
    };
    if derived {
        post.thumbnail = post.content.first_image();
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_slug(slug: &str) -> Result<String, PostServiceError> {
    let normalized = generate_slug(slug);
    if normalized.is_empty() {
        return Err(PostServiceError::ValidationError(format!(
            "Invalid slug: {}",
            slug
        )));
    }
    Ok(normalized)
}

/// Slug from the title, or a random one when the title has no usable
/// characters
fn slug_or_fallback(title: &str) -> String {
    let slug = generate_slug(title);
    if slug.is_empty() {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("post-{}", &id[..8])
    } else {
        slug
    }
}

/// Generate a URL slug.
///
/// Lower-cases, keeps letters and digits of any script, turns everything
/// else into single hyphens and trims hyphens from both ends.
pub fn generate_slug(title: &str) -> String {
    let mut result = String::with_capacity(title.len());
    let mut prev_hyphen = true;

    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            result.push(c);
            prev_hyphen = false;
        } else if !prev_hyphen {
            result.push('-');
            prev_hyphen = true;
        }
    }

    result.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{SqlxPostRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::document::Node;
    use crate::models::UserRole;
    use proptest::prelude::*;

    struct Fixture {
        _pool: DynDatabasePool,
        service: PostService,
        user_repo: Arc<dyn UserRepository>,
        cache: Arc<Cache>,
    }

    async fn setup_test_service() -> Fixture {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let cache = Arc::new(Cache::Memory(MemoryCache::new()));
        let service = PostService::new(
            SqlxPostRepository::boxed(pool.clone()),
            user_repo.clone(),
            cache.clone(),
        );
        Fixture {
            _pool: pool,
            service,
            user_repo,
            cache,
        }
    }

    async fn user(fx: &Fixture, name: &str, role: UserRole) -> User {
        fx.user_repo
            .create(&User::new(format!("{}@example.com", name), name.into(), role))
            .await
            .unwrap()
    }

    fn doc_with_image(src: &str) -> Document {
        Document::from_blocks(vec![
            Node::paragraph(vec![Node::text("Morning light over the harbour")]),
            Node::image(src),
        ])
    }

    fn input(title: &str) -> CreatePostInput {
        CreatePostInput {
            title: title.into(),
            content: Some(doc_with_image("/uploads/a.png")),
            ..Default::default()
        }
    }

    fn published(title: &str) -> CreatePostInput {
        CreatePostInput {
            status: Some(PostStatus::Published),
            ..input(title)
        }
    }

    // ========================================================================
    // Slug generation
    // ========================================================================

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
        assert_eq!(generate_slug("  Rust: 2024 -- edition!  "), "rust-2024-edition");
        assert_eq!(generate_slug("서울 여행"), "서울-여행");
        assert_eq!(generate_slug("!!!"), "");
    }

    #[test]
    fn test_slug_fallback_for_symbol_titles() {
        let slug = slug_or_fallback("???");
        assert!(slug.starts_with("post-"));
        assert_eq!(slug.len(), "post-".len() + 8);
    }

    proptest! {
        #[test]
        fn prop_slug_is_clean(title in "\\PC{0,40}") {
            let slug = generate_slug(&title);
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert!(slug.chars().all(|c| c == '-' || c.is_alphanumeric()));
        }

        #[test]
        fn prop_slug_is_idempotent(title in "[a-zA-Z0-9 _.-]{0,40}") {
            let slug = generate_slug(&title);
            prop_assert_eq!(generate_slug(&slug), slug);
        }
    }

    // ========================================================================
    // Create / update
    // ========================================================================

    #[tokio::test]
    async fn test_create_derives_fields() {
        let fx = setup_test_service().await;
        let editor = user(&fx, "ed", UserRole::Editor).await;

        let post = fx.service.create(&editor, input("Harbour Walk")).await.unwrap();
        assert_eq!(post.slug, "harbour-walk");
        assert_eq!(post.status, PostStatus::Draft);
        assert_eq!(post.thumbnail.as_deref(), Some("/uploads/a.png"));
        assert_eq!(post.excerpt, "Morning light over the harbour");
        assert!(post.content_html.contains("<img"));
        assert_eq!(post.author_id, Some(editor.id));
    }

    #[tokio::test]
    async fn test_create_rejects_reader_and_empty_title() {
        let fx = setup_test_service().await;
        let reader = user(&fx, "reader", UserRole::User).await;
        let editor = user(&fx, "ed", UserRole::Editor).await;

        let result = fx.service.create(&reader, input("Nope")).await;
        assert!(matches!(result, Err(PostServiceError::Forbidden(_))));

        let result = fx.service.create(&editor, input("   ")).await;
        assert!(matches!(result, Err(PostServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_slug_collision_rejected() {
        let fx = setup_test_service().await;
        let editor = user(&fx, "ed", UserRole::Editor).await;

        fx.service.create(&editor, input("Same Title")).await.unwrap();
        let result = fx.service.create(&editor, input("Same title!")).await;
        assert!(matches!(result, Err(PostServiceError::DuplicateSlug(s)) if s == "same-title"));

        let other = fx.service.create(&editor, input("Other")).await.unwrap();
        let result = fx
            .service
            .update(
                &editor,
                other.id,
                UpdatePostInput {
                    slug: Some("same-title".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(PostServiceError::DuplicateSlug(_))));

        // Keeping its own slug is fine
        fx.service
            .update(
                &editor,
                other.id,
                UpdatePostInput {
                    slug: Some("Other".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_document_rejected() {
        let fx = setup_test_service().await;
        let editor = user(&fx, "ed", UserRole::Editor).await;
        let bad = Document::from_json(r#"{"type":"doc","content":[{"type":"image","attrs":{}}]}"#)
            .unwrap();

        let result = fx
            .service
            .create(
                &editor,
                CreatePostInput {
                    title: "Broken".into(),
                    content: Some(bad),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(PostServiceError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn test_thumbnail_follows_document_unless_chosen() {
        let fx = setup_test_service().await;
        let editor = user(&fx, "ed", UserRole::Editor).await;
        let post = fx.service.create(&editor, input("Thumbs")).await.unwrap();

        let post = fx
            .service
            .update(
                &editor,
                post.id,
                UpdatePostInput {
                    content: Some(doc_with_image("/uploads/b.png")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(post.thumbnail.as_deref(), Some("/uploads/b.png"));

        let post = fx
            .service
            .update(
                &editor,
                post.id,
                UpdatePostInput {
                    thumbnail: Some("/uploads/cover.png".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let post = fx
            .service
            .update(
                &editor,
                post.id,
                UpdatePostInput {
                    content: Some(doc_with_image("/uploads/c.png")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(post.thumbnail.as_deref(), Some("/uploads/cover.png"));
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    #[tokio::test]
    async fn test_modify_permissions_follow_owner_role() {
        let fx = setup_test_service().await;
        let owner = user(&fx, "owner", UserRole::Editor).await;
        let other_editor = user(&fx, "other", UserRole::Editor).await;
        let sub = user(&fx, "sub", UserRole::SubAdmin).await;
        let admin = user(&fx, "admin", UserRole::Admin).await;

        let post = fx.service.create(&owner, input("Owned")).await.unwrap();
        let rename = || UpdatePostInput {
            title: Some("Renamed".into()),
            ..Default::default()
        };

        let result = fx.service.update(&other_editor, post.id, rename()).await;
        assert!(matches!(result, Err(PostServiceError::Forbidden(_))));
        fx.service.update(&owner, post.id, rename()).await.unwrap();
        fx.service.update(&sub, post.id, rename()).await.unwrap();

        let sub_post = fx.service.create(&sub, input("Sub post")).await.unwrap();
        let other_sub = user(&fx, "sub2", UserRole::SubAdmin).await;
        let result = fx.service.update(&other_sub, sub_post.id, rename()).await;
        assert!(matches!(result, Err(PostServiceError::Forbidden(_))));
        fx.service.update(&admin, sub_post.id, rename()).await.unwrap();
    }

    #[tokio::test]
    async fn test_demoted_owner_loses_access() {
        let fx = setup_test_service().await;
        let mut owner = user(&fx, "owner", UserRole::Editor).await;
        let post = fx.service.create(&owner, input("Mine")).await.unwrap();

        owner.role = UserRole::User;
        let owner = fx.user_repo.update(&owner).await.unwrap();

        let result = fx.service.delete(&owner, post.id).await;
        assert!(matches!(result, Err(PostServiceError::Forbidden(_))));
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    #[tokio::test]
    async fn test_publish_keeps_first_date_and_unpublish_clears() {
        let fx = setup_test_service().await;
        let editor = user(&fx, "ed", UserRole::Editor).await;
        let post = fx.service.create(&editor, input("Publish me")).await.unwrap();
        assert!(post.published_at.is_none());

        let published = fx.service.publish(&editor, post.id).await.unwrap();
        let first = published.published_at.unwrap();

        let edited = fx
            .service
            .update(
                &editor,
                post.id,
                UpdatePostInput {
                    title: Some("Edited".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.published_at, Some(first));

        let again = fx.service.publish(&editor, post.id).await.unwrap();
        assert_eq!(again.published_at, Some(first));

        let draft = fx.service.unpublish(&editor, post.id).await.unwrap();
        assert_eq!(draft.status, PostStatus::Draft);
        assert!(draft.published_at.is_none());
    }

    #[tokio::test]
    async fn test_published_lookups_are_cached_and_invalidated() {
        let fx = setup_test_service().await;
        let editor = user(&fx, "ed", UserRole::Editor).await;
        let post = fx.service.create(&editor, input("Cached")).await.unwrap();

        let result = fx.service.get_published_by_slug("cached").await;
        assert!(matches!(result, Err(PostServiceError::NotFound(_))));

        fx.service.publish(&editor, post.id).await.unwrap();
        let found = fx.service.get_published_by_slug("cached").await.unwrap();
        assert_eq!(found.id, post.id);
        let cached: Option<Post> = fx.cache.get("posts:slug:cached").await.unwrap();
        assert!(cached.is_some());

        let page = fx
            .service
            .list_published(None, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        fx.service.unpublish(&editor, post.id).await.unwrap();
        let cached: Option<Post> = fx.cache.get("posts:slug:cached").await.unwrap();
        assert!(cached.is_none());
        let page = fx
            .service
            .list_published(None, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let fx = setup_test_service().await;
        let editor = user(&fx, "ed", UserRole::Editor).await;
        let mut travel = input("Travel");
        travel.category = Some("travel".into());
        travel.status = Some(PostStatus::Published);
        fx.service.create(&editor, travel).await.unwrap();
        fx.service.create(&editor, input("Draft")).await.unwrap();

        let drafts = fx
            .service
            .list(
                &PostFilter {
                    status: Some(PostStatus::Draft),
                    ..Default::default()
                },
                &ListParams::default(),
            )
            .await
            .unwrap();
        assert_eq!(drafts.total, 1);

        let travel = fx
            .service
            .list_published(Some("travel"), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(travel.items.len(), 1);
        assert!(travel.items[0].published_at.is_some());
    }

    // ========================================================================
    // Views and scraps
    // ========================================================================

    #[tokio::test]
    async fn test_scrap_toggle_pairs() {
        let fx = setup_test_service().await;
        let editor = user(&fx, "ed", UserRole::Editor).await;
        let reader = user(&fx, "reader", UserRole::User).await;
        let post = fx.service.create(&editor, published("Scrap me")).await.unwrap();

        let on = fx.service.toggle_scrap(&reader, post.id).await.unwrap();
        assert_eq!(on, ScrapToggle { scrapped: true, scrap_count: 1 });
        let other = fx.service.toggle_scrap(&editor, post.id).await.unwrap();
        assert_eq!(other.scrap_count, 2);
        let off = fx.service.toggle_scrap(&reader, post.id).await.unwrap();
        assert_eq!(off, ScrapToggle { scrapped: false, scrap_count: 1 });

        let scraps = fx
            .service
            .list_scraps(&editor, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(scraps.total, 1);
        assert_eq!(scraps.items[0].id, post.id);

        let result = fx.service.toggle_scrap(&reader, 999).await;
        assert!(matches!(result, Err(PostServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_record_view() {
        let fx = setup_test_service().await;
        let editor = user(&fx, "ed", UserRole::Editor).await;
        let post = fx.service.create(&editor, published("Views")).await.unwrap();

        fx.service.record_view(None, post.id).await.unwrap();
        fx.service.record_view(None, post.id).await.unwrap();
        assert_eq!(fx.service.get_by_id(post.id).await.unwrap().view_count, 2);
        assert!(matches!(
            fx.service.record_view(None, 404).await,
            Err(PostServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_drafts_stay_hidden_from_readers() {
        let fx = setup_test_service().await;
        let editor = user(&fx, "ed", UserRole::Editor).await;
        let reader = user(&fx, "reader", UserRole::User).await;
        let draft = fx.service.create(&editor, input("Secret draft")).await.unwrap();

        assert!(matches!(
            fx.service.toggle_scrap(&reader, draft.id).await,
            Err(PostServiceError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.record_view(Some(&reader), draft.id).await,
            Err(PostServiceError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.record_view(None, draft.id).await,
            Err(PostServiceError::NotFound(_))
        ));
        assert_eq!(fx.service.get_by_id(draft.id).await.unwrap().view_count, 0);

        // A scrap made while the post was public disappears once it is a draft again
        let post = fx.service.create(&editor, published("Was public")).await.unwrap();
        fx.service.toggle_scrap(&reader, post.id).await.unwrap();
        fx.service.toggle_scrap(&editor, post.id).await.unwrap();
        fx.service.unpublish(&editor, post.id).await.unwrap();

        let scraps = fx
            .service
            .list_scraps(&reader, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(scraps.total, 0);
        assert!(scraps.items.is_empty());

        let scraps = fx
            .service
            .list_scraps(&editor, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(scraps.total, 1);
        assert!(fx.service.get_visible(Some(&editor), post.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_without_changes_writes_nothing() {
        let fx = setup_test_service().await;
        let editor = user(&fx, "ed", UserRole::Editor).await;
        let post = fx.service.create(&editor, input("Untouched")).await.unwrap();

        let same = fx
            .service
            .update(&editor, post.id, UpdatePostInput::default())
            .await
            .unwrap();
        assert_eq!(same.updated_at, post.updated_at);
        assert_eq!(same.title, "Untouched");

        let reader = user(&fx, "reader", UserRole::User).await;
        let result = fx
            .service
            .update(&reader, post.id, UpdatePostInput::default())
            .await;
        assert!(matches!(result, Err(PostServiceError::Forbidden(_))));
    }
}
