//! Gallery repository
//!
//! Database operations for gallery items. Tags, AI tags and the embedding
//! vector are stored as JSON text.

use super::{from_json_text, json_element_pattern, to_json_text};
use crate::analysis::{AnalysisResult, EmbeddingSource, ImageCategory};
use crate::db::{Backend, DynDatabasePool};
use crate::models::{GalleryFilter, GalleryItem};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Gallery repository trait
#[async_trait]
pub trait GalleryRepository: Send + Sync {
    async fn create(&self, item: &GalleryItem) -> Result<GalleryItem>;

    async fn get_by_id(&self, id: i64) -> Result<Option<GalleryItem>>;

    /// Newest first
    async fn list(&self, filter: &GalleryFilter, offset: i64, limit: i64) -> Result<Vec<GalleryItem>>;

    async fn count(&self, filter: &GalleryFilter) -> Result<i64>;

    /// Write the editor fields (title, description, tags, image)
    async fn update(&self, item: &GalleryItem) -> Result<GalleryItem>;

    /// Write the AI-derived fields
    async fn update_analysis(&self, id: i64, analysis: &AnalysisResult) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Items without an embedding: never-failed items first, then the
    /// ones whose last analysis failure is oldest
    async fn list_missing_analysis(&self, limit: i64) -> Result<Vec<GalleryItem>>;

    /// Stamp a failed analysis attempt so later backfills try other items first
    async fn record_analysis_failure(&self, id: i64) -> Result<()>;

    /// Number of items pointing at the stored object `key`
    async fn count_by_storage_key(&self, key: &str) -> Result<i64>;

    /// Every item that has an embedding
    async fn list_with_embeddings(&self) -> Result<Vec<GalleryItem>>;
}

/// SQLx-based gallery repository implementation
pub struct SqlxGalleryRepository {
    pool: DynDatabasePool,
}

impl SqlxGalleryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn GalleryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl GalleryRepository for SqlxGalleryRepository {
    async fn create(&self, item: &GalleryItem) -> Result<GalleryItem> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_item_sqlite(pool, item).await,
            Backend::Mysql(pool) => create_item_mysql(pool, item).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<GalleryItem>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_item_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_item_mysql(pool, id).await,
        }
    }

    async fn list(&self, filter: &GalleryFilter, offset: i64, limit: i64) -> Result<Vec<GalleryItem>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_items_sqlite(pool, filter, offset, limit).await,
            Backend::Mysql(pool) => list_items_mysql(pool, filter, offset, limit).await,
        }
    }

    async fn count(&self, filter: &GalleryFilter) -> Result<i64> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => count_items_sqlite(pool, filter).await,
            Backend::Mysql(pool) => count_items_mysql(pool, filter).await,
        }
    }

    async fn update(&self, item: &GalleryItem) -> Result<GalleryItem> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_item_sqlite(pool, item).await,
            Backend::Mysql(pool) => update_item_mysql(pool, item).await,
        }
    }

    async fn update_analysis(&self, id: i64, analysis: &AnalysisResult) -> Result<()> {
        let tags = to_json_text(&analysis.tags)?;
        let embedding = to_json_text(&analysis.embedding)?;
        let rows = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(UPDATE_ANALYSIS)
                .bind(analysis.category.as_str())
                .bind(&analysis.summary)
                .bind(&analysis.visual_detail)
                .bind(&tags)
                .bind(&embedding)
                .bind(analysis.embedding_source.as_str())
                .bind(Utc::now())
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to store analysis")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(UPDATE_ANALYSIS)
                .bind(analysis.category.as_str())
                .bind(&analysis.summary)
                .bind(&analysis.visual_detail)
                .bind(&tags)
                .bind(&embedding)
                .bind(analysis.embedding_source.as_str())
                .bind(Utc::now())
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to store analysis")?
                .rows_affected(),
        };
        if rows == 0 {
            anyhow::bail!("Gallery item {} not found", id);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM gallery_items WHERE id = ?";
        let rows = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete gallery item")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete gallery item")?
                .rows_affected(),
        };
        Ok(rows > 0)
    }

    async fn list_missing_analysis(&self, limit: i64) -> Result<Vec<GalleryItem>> {
        let sql = select_items(
            "WHERE embedding IS NULL OR embedding = '' OR embedding = '[]' \
             ORDER BY analysis_failed_at IS NOT NULL, analysis_failed_at ASC, id ASC LIMIT ?",
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(limit)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list unanalyzed items")?;
                rows.iter().map(row_to_item_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(limit)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list unanalyzed items")?;
                rows.iter().map(row_to_item_mysql).collect()
            }
        }
    }

    async fn record_analysis_failure(&self, id: i64) -> Result<()> {
        let sql = "UPDATE gallery_items SET analysis_failed_at = ? WHERE id = ?";
        let now = Utc::now();
        let rows = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to record analysis failure")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to record analysis failure")?
                .rows_affected(),
        };
        if rows == 0 {
            anyhow::bail!("Gallery item {} not found", id);
        }
        Ok(())
    }

    async fn count_by_storage_key(&self, key: &str) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM gallery_items WHERE storage_key = ?";
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(key)
                .fetch_one(pool)
                .await
                .context("Failed to count items by storage key")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(key)
                .fetch_one(pool)
                .await
                .context("Failed to count items by storage key")?
                .get("count"),
        };
        Ok(count)
    }

    async fn list_with_embeddings(&self) -> Result<Vec<GalleryItem>> {
        let sql = select_items("WHERE embedding IS NOT NULL AND embedding != '' AND embedding != '[]' ORDER BY id ASC");
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list analyzed items")?;
                rows.iter().map(row_to_item_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list analyzed items")?;
                rows.iter().map(row_to_item_mysql).collect()
            }
        }
    }
}

const ITEM_COLUMNS: &str = "id, title, description, tags, image_url, storage_key, width, height, \
     ai_category, ai_description, ai_visual_detail, ai_tags, embedding, embedding_source, \
     author_id, created_at, updated_at";

const INSERT_ITEM: &str = r#"
    INSERT INTO gallery_items (title, description, tags, image_url, storage_key, width, height,
                               ai_tags, author_id, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, '[]', ?, ?, ?)
"#;

const UPDATE_ITEM: &str = r#"
    UPDATE gallery_items
    SET title = ?, description = ?, tags = ?, image_url = ?, storage_key = ?, updated_at = ?
    WHERE id = ?
"#;

const UPDATE_ANALYSIS: &str = r#"
    UPDATE gallery_items
    SET ai_category = ?, ai_description = ?, ai_visual_detail = ?, ai_tags = ?,
        embedding = ?, embedding_source = ?, analysis_failed_at = NULL, updated_at = ?
    WHERE id = ?
"#;

const FILTER_CLAUSE: &str = "WHERE (? IS NULL OR tags LIKE ? ESCAPE '!' OR ai_tags LIKE ? ESCAPE '!') \
     AND (? IS NULL OR ai_category = ?) \
     AND (? IS NULL OR author_id = ?)";

fn select_items(filter: &str) -> String {
    format!("SELECT {} FROM gallery_items {}", ITEM_COLUMNS, filter)
}

/// Bind values for `FILTER_CLAUSE`, in order
struct FilterParams {
    tag: Option<String>,
    tag_pattern: Option<String>,
    category: Option<&'static str>,
    author_id: Option<i64>,
}

impl FilterParams {
    fn new(filter: &GalleryFilter) -> Self {
        let tag = filter
            .tag
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty());
        Self {
            tag_pattern: tag.as_deref().map(json_element_pattern),
            tag,
            category: filter.category.map(|c| c.as_str()),
            author_id: filter.author_id,
        }
    }
}

struct StoredColumns {
    tags: Option<String>,
    ai_tags: Option<String>,
    ai_category: Option<String>,
    embedding: Option<String>,
    embedding_source: Option<String>,
}

fn decode_columns(item: &mut GalleryItem, columns: StoredColumns) -> Result<()> {
    item.tags = from_json_text(columns.tags)?;
    item.ai_tags = from_json_text(columns.ai_tags)?;
    item.ai_category = columns
        .ai_category
        .as_deref()
        .map(ImageCategory::from_str)
        .transpose()?;
    let embedding: Vec<f32> = from_json_text(columns.embedding)?;
    item.embedding = (!embedding.is_empty()).then_some(embedding);
    item.embedding_source = columns
        .embedding_source
        .as_deref()
        .map(EmbeddingSource::from_str)
        .transpose()?;
    Ok(())
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_item_sqlite(pool: &SqlitePool, item: &GalleryItem) -> Result<GalleryItem> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_ITEM)
        .bind(&item.title)
        .bind(&item.description)
        .bind(to_json_text(&item.tags)?)
        .bind(&item.image_url)
        .bind(&item.storage_key)
        .bind(item.width)
        .bind(item.height)
        .bind(item.author_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create gallery item")?;

    get_item_sqlite(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| anyhow::anyhow!("Gallery item not found after insert"))
}

async fn get_item_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<GalleryItem>> {
    let row = sqlx::query(&select_items("WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get gallery item")?;

    row.as_ref().map(row_to_item_sqlite).transpose()
}

async fn list_items_sqlite(
    pool: &SqlitePool,
    filter: &GalleryFilter,
    offset: i64,
    limit: i64,
) -> Result<Vec<GalleryItem>> {
    let params = FilterParams::new(filter);
    let sql = select_items(&format!(
        "{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        FILTER_CLAUSE
    ));
    let rows = sqlx::query(&sql)
        .bind(&params.tag)
        .bind(&params.tag_pattern)
        .bind(&params.tag_pattern)
        .bind(params.category)
        .bind(params.category)
        .bind(params.author_id)
        .bind(params.author_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list gallery items")?;

    rows.iter().map(row_to_item_sqlite).collect()
}

async fn count_items_sqlite(pool: &SqlitePool, filter: &GalleryFilter) -> Result<i64> {
    let params = FilterParams::new(filter);
    let sql = format!("SELECT COUNT(*) as count FROM gallery_items {}", FILTER_CLAUSE);
    let row = sqlx::query(&sql)
        .bind(&params.tag)
        .bind(&params.tag_pattern)
        .bind(&params.tag_pattern)
        .bind(params.category)
        .bind(params.category)
        .bind(params.author_id)
        .bind(params.author_id)
        .fetch_one(pool)
        .await
        .context("Failed to count gallery items")?;

    Ok(row.get("count"))
}

async fn update_item_sqlite(pool: &SqlitePool, item: &GalleryItem) -> Result<GalleryItem> {
    sqlx::query(UPDATE_ITEM)
        .bind(&item.title)
        .bind(&item.description)
        .bind(to_json_text(&item.tags)?)
        .bind(&item.image_url)
        .bind(&item.storage_key)
        .bind(Utc::now())
        .bind(item.id)
        .execute(pool)
        .await
        .context("Failed to update gallery item")?;

    get_item_sqlite(pool, item.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Gallery item not found after update"))
}

fn row_to_item_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<GalleryItem> {
    let mut item = GalleryItem {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        tags: Vec::new(),
        image_url: row.get("image_url"),
        storage_key: row.get("storage_key"),
        width: row.get("width"),
        height: row.get("height"),
        ai_category: None,
        ai_description: row.get("ai_description"),
        ai_visual_detail: row.get("ai_visual_detail"),
        ai_tags: Vec::new(),
        embedding: None,
        embedding_source: None,
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    };
    decode_columns(
        &mut item,
        StoredColumns {
            tags: row.get("tags"),
            ai_tags: row.get("ai_tags"),
            ai_category: row.get("ai_category"),
            embedding: row.get("embedding"),
            embedding_source: row.get("embedding_source"),
        },
    )?;
    Ok(item)
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_item_mysql(pool: &MySqlPool, item: &GalleryItem) -> Result<GalleryItem> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_ITEM)
        .bind(&item.title)
        .bind(&item.description)
        .bind(to_json_text(&item.tags)?)
        .bind(&item.image_url)
        .bind(&item.storage_key)
        .bind(item.width)
        .bind(item.height)
        .bind(item.author_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create gallery item")?;

    get_item_mysql(pool, result.last_insert_id() as i64)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Gallery item not found after insert"))
}

async fn get_item_mysql(pool: &MySqlPool, id: i64) -> Result<Option<GalleryItem>> {
    let row = sqlx::query(&select_items("WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get gallery item")?;

    row.as_ref().map(row_to_item_mysql).transpose()
}

async fn list_items_mysql(
    pool: &MySqlPool,
    filter: &GalleryFilter,
    offset: i64,
    limit: i64,
) -> Result<Vec<GalleryItem>> {
    let params = FilterParams::new(filter);
    let sql = select_items(&format!(
        "{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        FILTER_CLAUSE
    ));
    let rows = sqlx::query(&sql)
        .bind(&params.tag)
        .bind(&params.tag_pattern)
        .bind(&params.tag_pattern)
        .bind(params.category)
        .bind(params.category)
        .bind(params.author_id)
        .bind(params.author_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list gallery items")?;

    rows.iter().map(row_to_item_mysql).collect()
}

async fn count_items_mysql(pool: &MySqlPool, filter: &GalleryFilter) -> Result<i64> {
    let params = FilterParams::new(filter);
    let sql = format!("SELECT COUNT(*) as count FROM gallery_items {}", FILTER_CLAUSE);
    let row = sqlx::query(&sql)
        .bind(&params.tag)
        .bind(&params.tag_pattern)
        .bind(&params.tag_pattern)
        .bind(params.category)
        .bind(params.category)
        .bind(params.author_id)
        .bind(params.author_id)
        .fetch_one(pool)
        .await
        .context("Failed to count gallery items")?;

    Ok(row.get("count"))
}

async fn update_item_mysql(pool: &MySqlPool, item: &GalleryItem) -> Result<GalleryItem> {
    sqlx::query(UPDATE_ITEM)
        .bind(&item.title)
        .bind(&item.description)
        .bind(to_json_text(&item.tags)?)
        .bind(&item.image_url)
        .bind(&item.storage_key)
        .bind(Utc::now())
        .bind(item.id)
        .execute(pool)
        .await
        .context("Failed to update gallery item")?;

    get_item_mysql(pool, item.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Gallery item not found after update"))
}

fn row_to_item_mysql(row: &sqlx::mysql::MySqlRow) -> Result<GalleryItem> {
    let mut item = GalleryItem {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        tags: Vec::new(),
        image_url: row.get("image_url"),
        storage_key: row.get("storage_key"),
        width: row.get::<Option<i32>, _>("width").map(i64::from),
        height: row.get::<Option<i32>, _>("height").map(i64::from),
        ai_category: None,
        ai_description: row.get("ai_description"),
        ai_visual_detail: row.get("ai_visual_detail"),
        ai_tags: Vec::new(),
        embedding: None,
        embedding_source: None,
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    };
    decode_columns(
        &mut item,
        StoredColumns {
            tags: row.get("tags"),
            ai_tags: row.get("ai_tags"),
            ai_category: row.get("ai_category"),
            embedding: row.get("embedding"),
            embedding_source: row.get("embedding_source"),
        },
    )?;
    Ok(item)
}
