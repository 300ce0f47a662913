//! Post repository
//!
//! Database operations for blog posts and their bookmarks ("scraps").
//! The document tree is stored as JSON text in `content`.

use crate::db::{Backend, DynDatabasePool};
use crate::document::Document;
use crate::models::{Post, PostFilter, PostStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &Post) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    /// Newest first (by publish date, then creation date)
    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64) -> Result<Vec<Post>>;

    async fn count(&self, filter: &PostFilter) -> Result<i64>;

    /// Write every mutable field of `post`
    async fn update(&self, post: &Post) -> Result<Post>;

    /// Returns whether a row was removed
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;

    /// Whether a post other than `exclude_id` uses `slug`
    async fn exists_by_slug_excluding(&self, slug: &str, exclude_id: i64) -> Result<bool>;

    async fn increment_view(&self, id: i64) -> Result<()>;

    /// Bookmark a post; returns the post's scrap count afterwards
    async fn add_scrap(&self, user_id: i64, post_id: i64) -> Result<i64>;

    /// Remove a bookmark; returns the post's scrap count afterwards
    async fn remove_scrap(&self, user_id: i64, post_id: i64) -> Result<i64>;

    async fn has_scrap(&self, user_id: i64, post_id: i64) -> Result<bool>;

    /// Posts bookmarked by a user, most recently bookmarked first
    /// Bookmarked posts, newest bookmark first; `published_only` hides drafts
    async fn list_scrapped_by_user(
        &self,
        user_id: i64,
        published_only: bool,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Post>>;

    async fn count_scrapped_by_user(&self, user_id: i64, published_only: bool) -> Result<i64>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_post_sqlite(pool, post).await,
            Backend::Mysql(pool) => create_post_mysql(pool, post).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_post_sqlite(pool, "WHERE id = ?", id).await,
            Backend::Mysql(pool) => get_post_mysql(pool, "WHERE id = ?", id).await,
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_post_sqlite(pool, "WHERE slug = ?", slug.to_string()).await,
            Backend::Mysql(pool) => get_post_mysql(pool, "WHERE slug = ?", slug.to_string()).await,
        }
    }

    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64) -> Result<Vec<Post>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_posts_sqlite(pool, filter, offset, limit).await,
            Backend::Mysql(pool) => list_posts_mysql(pool, filter, offset, limit).await,
        }
    }

    async fn count(&self, filter: &PostFilter) -> Result<i64> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => count_posts_sqlite(pool, filter).await,
            Backend::Mysql(pool) => count_posts_mysql(pool, filter).await,
        }
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_post_sqlite(pool, post).await,
            Backend::Mysql(pool) => update_post_mysql(pool, post).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let rows = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete post")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete post")?
                .rows_affected(),
        };
        Ok(rows > 0)
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        self.exists_by_slug_excluding(slug, 0).await
    }

    async fn exists_by_slug_excluding(&self, slug: &str, exclude_id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) as count FROM posts WHERE slug = ? AND id != ?";
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(slug)
                .bind(exclude_id)
                .fetch_one(pool)
                .await
                .context("Failed to check slug")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(slug)
                .bind(exclude_id)
                .fetch_one(pool)
                .await
                .context("Failed to check slug")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn increment_view(&self, id: i64) -> Result<()> {
        let sql = "UPDATE posts SET view_count = view_count + 1 WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to increment view count")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to increment view count")?;
            }
        }
        Ok(())
    }

    async fn add_scrap(&self, user_id: i64, post_id: i64) -> Result<i64> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => add_scrap_sqlite(pool, user_id, post_id).await,
            Backend::Mysql(pool) => add_scrap_mysql(pool, user_id, post_id).await,
        }
    }

    async fn remove_scrap(&self, user_id: i64, post_id: i64) -> Result<i64> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => remove_scrap_sqlite(pool, user_id, post_id).await,
            Backend::Mysql(pool) => remove_scrap_mysql(pool, user_id, post_id).await,
        }
    }

    async fn has_scrap(&self, user_id: i64, post_id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) as count FROM post_scraps WHERE user_id = ? AND post_id = ?";
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(user_id)
                .bind(post_id)
                .fetch_one(pool)
                .await
                .context("Failed to check scrap")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(user_id)
                .bind(post_id)
                .fetch_one(pool)
                .await
                .context("Failed to check scrap")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn list_scrapped_by_user(
        &self,
        user_id: i64,
        published_only: bool,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {} FROM posts p INNER JOIN post_scraps s ON s.post_id = p.id \
             WHERE s.user_id = ?{} ORDER BY s.created_at DESC, p.id DESC LIMIT ? OFFSET ?",
            prefixed_columns("p"),
            scrap_status_clause(published_only)
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(user_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list scrapped posts")?;
                rows.iter().map(row_to_post_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(user_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list scrapped posts")?;
                rows.iter().map(row_to_post_mysql).collect()
            }
        }
    }

    async fn count_scrapped_by_user(&self, user_id: i64, published_only: bool) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) as count FROM post_scraps s INNER JOIN posts p ON p.id = s.post_id \
             WHERE s.user_id = ?{}",
            scrap_status_clause(published_only)
        );
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(user_id)
                .fetch_one(pool)
                .await
                .context("Failed to count scrapped posts")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(user_id)
                .fetch_one(pool)
                .await
                .context("Failed to count scrapped posts")?
                .get("count"),
        };
        Ok(count)
    }
}

fn scrap_status_clause(published_only: bool) -> &'static str {
    if published_only {
        " AND p.status = 'published'"
    } else {
        ""
    }
}

const POST_COLUMNS: [&str; 15] = [
    "id",
    "slug",
    "title",
    "content",
    "content_html",
    "excerpt",
    "thumbnail",
    "category",
    "status",
    "published_at",
    "view_count",
    "scrap_count",
    "author_id",
    "created_at",
    "updated_at",
];

fn prefixed_columns(table: &str) -> String {
    POST_COLUMNS
        .iter()
        .map(|c| format!("{}.{}", table, c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn select_posts(filter: &str) -> String {
    format!("SELECT {} FROM posts {}", POST_COLUMNS.join(", "), filter)
}

const FILTER_CLAUSE: &str = "WHERE (? IS NULL OR status = ?) \
     AND (? IS NULL OR category = ?) \
     AND (? IS NULL OR author_id = ?)";

const ORDER_CLAUSE: &str = "ORDER BY COALESCE(published_at, created_at) DESC, id DESC";

const INSERT_POST: &str = r#"
    INSERT INTO posts (slug, title, content, content_html, excerpt, thumbnail, category,
                       status, published_at, view_count, scrap_count, author_id, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?, ?)
"#;

const UPDATE_POST: &str = r#"
    UPDATE posts
    SET slug = ?, title = ?, content = ?, content_html = ?, excerpt = ?, thumbnail = ?,
        category = ?, status = ?, published_at = ?, updated_at = ?
    WHERE id = ?
"#;

fn content_json(post: &Post) -> String {
    post.content.to_json()
}

fn parse_content(json: &str) -> Result<Document> {
    Document::from_json(json).context("Invalid post content in database")
}

fn parse_status(status: &str) -> Result<PostStatus> {
    PostStatus::parse(status).ok_or_else(|| anyhow::anyhow!("Invalid post status in database: {}", status))
}

fn status_param(filter: &PostFilter) -> Option<&'static str> {
    filter.status.map(|s| s.as_str())
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_post_sqlite(pool: &SqlitePool, post: &Post) -> Result<Post> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_POST)
        .bind(&post.slug)
        .bind(&post.title)
        .bind(content_json(post))
        .bind(&post.content_html)
        .bind(&post.excerpt)
        .bind(&post.thumbnail)
        .bind(&post.category)
        .bind(post.status.as_str())
        .bind(post.published_at)
        .bind(post.author_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create post")?;

    Ok(Post {
        id: result.last_insert_rowid(),
        view_count: 0,
        scrap_count: 0,
        created_at: now,
        updated_at: now,
        ..post.clone()
    })
}

async fn get_post_sqlite<T>(pool: &SqlitePool, filter: &str, key: T) -> Result<Option<Post>>
where
    T: for<'q> sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite> + Send + 'static,
{
    let row = sqlx::query(&select_posts(filter))
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get post")?;

    row.as_ref().map(row_to_post_sqlite).transpose()
}

async fn list_posts_sqlite(
    pool: &SqlitePool,
    filter: &PostFilter,
    offset: i64,
    limit: i64,
) -> Result<Vec<Post>> {
    let sql = select_posts(&format!("{} {} LIMIT ? OFFSET ?", FILTER_CLAUSE, ORDER_CLAUSE));
    let rows = sqlx::query(&sql)
        .bind(status_param(filter))
        .bind(status_param(filter))
        .bind(&filter.category)
        .bind(&filter.category)
        .bind(filter.author_id)
        .bind(filter.author_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    rows.iter().map(row_to_post_sqlite).collect()
}

async fn count_posts_sqlite(pool: &SqlitePool, filter: &PostFilter) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) as count FROM posts {}", FILTER_CLAUSE);
    let row = sqlx::query(&sql)
        .bind(status_param(filter))
        .bind(status_param(filter))
        .bind(&filter.category)
        .bind(&filter.category)
        .bind(filter.author_id)
        .bind(filter.author_id)
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?;

    Ok(row.get("count"))
}

async fn update_post_sqlite(pool: &SqlitePool, post: &Post) -> Result<Post> {
    sqlx::query(UPDATE_POST)
        .bind(&post.slug)
        .bind(&post.title)
        .bind(content_json(post))
        .bind(&post.content_html)
        .bind(&post.excerpt)
        .bind(&post.thumbnail)
        .bind(&post.category)
        .bind(post.status.as_str())
        .bind(post.published_at)
        .bind(Utc::now())
        .bind(post.id)
        .execute(pool)
        .await
        .context("Failed to update post")?;

    get_post_sqlite(pool, "WHERE id = ?", post.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
}

async fn add_scrap_sqlite(pool: &SqlitePool, user_id: i64, post_id: i64) -> Result<i64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO post_scraps (user_id, post_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(user_id)
    .bind(post_id)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .context("Failed to add scrap")?
    .rows_affected();

    if inserted > 0 {
        sqlx::query("UPDATE posts SET scrap_count = scrap_count + 1 WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .context("Failed to update scrap count")?;
    }

    let count: i64 = sqlx::query("SELECT scrap_count FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read scrap count")?
        .get("scrap_count");

    tx.commit().await.context("Failed to commit scrap")?;
    Ok(count)
}

async fn remove_scrap_sqlite(pool: &SqlitePool, user_id: i64, post_id: i64) -> Result<i64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let removed = sqlx::query("DELETE FROM post_scraps WHERE user_id = ? AND post_id = ?")
        .bind(user_id)
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .context("Failed to remove scrap")?
        .rows_affected();

    if removed > 0 {
        sqlx::query("UPDATE posts SET scrap_count = MAX(scrap_count - 1, 0) WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .context("Failed to update scrap count")?;
    }

    let count: i64 = sqlx::query("SELECT scrap_count FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read scrap count")?
        .get("scrap_count");

    tx.commit().await.context("Failed to commit scrap removal")?;
    Ok(count)
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    let content: String = row.get("content");
    let status: String = row.get("status");

    Ok(Post {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        content: parse_content(&content)?,
        content_html: row.get("content_html"),
        excerpt: row.get("excerpt"),
        thumbnail: row.get("thumbnail"),
        category: row.get("category"),
        status: parse_status(&status)?,
        published_at: row.get("published_at"),
        view_count: row.get("view_count"),
        scrap_count: row.get("scrap_count"),
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_post_mysql(pool: &MySqlPool, post: &Post) -> Result<Post> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_POST)
        .bind(&post.slug)
        .bind(&post.title)
        .bind(content_json(post))
        .bind(&post.content_html)
        .bind(&post.excerpt)
        .bind(&post.thumbnail)
        .bind(&post.category)
        .bind(post.status.as_str())
        .bind(post.published_at)
        .bind(post.author_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create post")?;

    Ok(Post {
        id: result.last_insert_id() as i64,
        view_count: 0,
        scrap_count: 0,
        created_at: now,
        updated_at: now,
        ..post.clone()
    })
}

async fn get_post_mysql<T>(pool: &MySqlPool, filter: &str, key: T) -> Result<Option<Post>>
where
    T: for<'q> sqlx::Encode<'q, sqlx::MySql> + sqlx::Type<sqlx::MySql> + Send + 'static,
{
    let row = sqlx::query(&select_posts(filter))
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get post")?;

    row.as_ref().map(row_to_post_mysql).transpose()
}

async fn list_posts_mysql(
    pool: &MySqlPool,
    filter: &PostFilter,
    offset: i64,
    limit: i64,
) -> Result<Vec<Post>> {
    let sql = select_posts(&format!("{} {} LIMIT ? OFFSET ?", FILTER_CLAUSE, ORDER_CLAUSE));
    let rows = sqlx::query(&sql)
        .bind(status_param(filter))
        .bind(status_param(filter))
        .bind(&filter.category)
        .bind(&filter.category)
        .bind(filter.author_id)
        .bind(filter.author_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    rows.iter().map(row_to_post_mysql).collect()
}

async fn count_posts_mysql(pool: &MySqlPool, filter: &PostFilter) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) as count FROM posts {}", FILTER_CLAUSE);
    let row = sqlx::query(&sql)
        .bind(status_param(filter))
        .bind(status_param(filter))
        .bind(&filter.category)
        .bind(&filter.category)
        .bind(filter.author_id)
        .bind(filter.author_id)
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?;

    Ok(row.get("count"))
}

async fn update_post_mysql(pool: &MySqlPool, post: &Post) -> Result<Post> {
    sqlx::query(UPDATE_POST)
        .bind(&post.slug)
        .bind(&post.title)
        .bind(content_json(post))
        .bind(&post.content_html)
        .bind(&post.excerpt)
        .bind(&post.thumbnail)
        .bind(&post.category)
        .bind(post.status.as_str())
        .bind(post.published_at)
        .bind(Utc::now())
        .bind(post.id)
        .execute(pool)
        .await
        .context("Failed to update post")?;

    get_post_mysql(pool, "WHERE id = ?", post.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
}

async fn add_scrap_mysql(pool: &MySqlPool, user_id: i64, post_id: i64) -> Result<i64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let inserted = sqlx::query(
        "INSERT IGNORE INTO post_scraps (user_id, post_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(user_id)
    .bind(post_id)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .context("Failed to add scrap")?
    .rows_affected();

    if inserted > 0 {
        sqlx::query("UPDATE posts SET scrap_count = scrap_count + 1 WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .context("Failed to update scrap count")?;
    }

    let count: i64 = sqlx::query("SELECT scrap_count FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read scrap count")?
        .get("scrap_count");

    tx.commit().await.context("Failed to commit scrap")?;
    Ok(count)
}

async fn remove_scrap_mysql(pool: &MySqlPool, user_id: i64, post_id: i64) -> Result<i64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let removed = sqlx::query("DELETE FROM post_scraps WHERE user_id = ? AND post_id = ?")
        .bind(user_id)
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .context("Failed to remove scrap")?
        .rows_affected();

    if removed > 0 {
        sqlx::query("UPDATE posts SET scrap_count = GREATEST(scrap_count - 1, 0) WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .context("Failed to update scrap count")?;
    }

    let count: i64 = sqlx::query("SELECT scrap_count FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read scrap count")?
        .get("scrap_count");

    tx.commit().await.context("Failed to commit scrap removal")?;
    Ok(count)
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Post> {
    let content: String = row.get("content");
    let status: String = row.get("status");

    Ok(Post {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        content: parse_content(&content)?,
        content_html: row.get("content_html"),
        excerpt: row.get("excerpt"),
        thumbnail: row.get("thumbnail"),
        category: row.get("category"),
        status: parse_status(&status)?,
        published_at: row.get("published_at"),
        view_count: row.get("view_count"),
        scrap_count: row.get("scrap_count"),
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
