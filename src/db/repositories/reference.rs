//! Reference repository
//!
//! Database operations for curated reference links.

use super::{from_json_text, json_element_pattern, to_json_text};
use crate::db::{Backend, DynDatabasePool};
use crate::models::Reference;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Reference repository trait
#[async_trait]
pub trait ReferenceRepository: Send + Sync {
    async fn create(&self, reference: &Reference) -> Result<Reference>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Reference>>;

    /// Ordered by sort_order, then newest first; optionally one category
    async fn list(&self, category: Option<&str>) -> Result<Vec<Reference>>;

    async fn update(&self, reference: &Reference) -> Result<Reference>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Returns whether the reference exists
    async fn increment_click(&self, id: i64) -> Result<bool>;
}

/// SQLx-based reference repository implementation
pub struct SqlxReferenceRepository {
    pool: DynDatabasePool,
}

impl SqlxReferenceRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ReferenceRepository> {
        Arc::new(Self::new(pool))
    }
}

const REFERENCE_COLUMNS: &str = "id, title, url, description, thumbnail_url, logo_url, categories, \
     click_count, sort_order, created_by, created_at, updated_at";

const INSERT_REFERENCE: &str = r#"
    INSERT INTO references_links (title, url, description, thumbnail_url, logo_url, categories,
                                  click_count, sort_order, created_by, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
"#;

const UPDATE_REFERENCE: &str = r#"
    UPDATE references_links
    SET title = ?, url = ?, description = ?, thumbnail_url = ?, logo_url = ?, categories = ?,
        sort_order = ?, updated_at = ?
    WHERE id = ?
"#;

fn select_references(filter: &str) -> String {
    format!("SELECT {} FROM references_links {}", REFERENCE_COLUMNS, filter)
}

const LIST_FILTER: &str =
    "WHERE (? IS NULL OR categories LIKE ? ESCAPE '!') ORDER BY sort_order ASC, id DESC";

#[async_trait]
impl ReferenceRepository for SqlxReferenceRepository {
    async fn create(&self, reference: &Reference) -> Result<Reference> {
        let now = Utc::now();
        let categories = to_json_text(&reference.categories)?;
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(INSERT_REFERENCE)
                .bind(&reference.title)
                .bind(&reference.url)
                .bind(&reference.description)
                .bind(&reference.thumbnail_url)
                .bind(&reference.logo_url)
                .bind(&categories)
                .bind(reference.sort_order)
                .bind(reference.created_by)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create reference")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(INSERT_REFERENCE)
                .bind(&reference.title)
                .bind(&reference.url)
                .bind(&reference.description)
                .bind(&reference.thumbnail_url)
                .bind(&reference.logo_url)
                .bind(&categories)
                .bind(reference.sort_order)
                .bind(reference.created_by)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create reference")?
                .last_insert_id() as i64,
        };

        Ok(Reference {
            id,
            click_count: 0,
            created_at: now,
            updated_at: now,
            ..reference.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Reference>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_reference_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_reference_mysql(pool, id).await,
        }
    }

    async fn list(&self, category: Option<&str>) -> Result<Vec<Reference>> {
        let category = category.map(str::trim).filter(|c| !c.is_empty());
        let pattern = category.map(json_element_pattern);
        let sql = select_references(LIST_FILTER);
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(category)
                    .bind(&pattern)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list references")?;
                rows.iter().map(row_to_reference_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(category)
                    .bind(&pattern)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list references")?;
                rows.iter().map(row_to_reference_mysql).collect()
            }
        }
    }

    async fn update(&self, reference: &Reference) -> Result<Reference> {
        let categories = to_json_text(&reference.categories)?;
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(UPDATE_REFERENCE)
                    .bind(&reference.title)
                    .bind(&reference.url)
                    .bind(&reference.description)
                    .bind(&reference.thumbnail_url)
                    .bind(&reference.logo_url)
                    .bind(&categories)
                    .bind(reference.sort_order)
                    .bind(Utc::now())
                    .bind(reference.id)
                    .execute(pool)
                    .await
                    .context("Failed to update reference")?;
                get_reference_sqlite(pool, reference.id).await
            }
            Backend::Mysql(pool) => {
                sqlx::query(UPDATE_REFERENCE)
                    .bind(&reference.title)
                    .bind(&reference.url)
                    .bind(&reference.description)
                    .bind(&reference.thumbnail_url)
                    .bind(&reference.logo_url)
                    .bind(&categories)
                    .bind(reference.sort_order)
                    .bind(Utc::now())
                    .bind(reference.id)
                    .execute(pool)
                    .await
                    .context("Failed to update reference")?;
                get_reference_mysql(pool, reference.id).await
            }
        }?
        .ok_or_else(|| anyhow::anyhow!("Reference not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM references_links WHERE id = ?";
        let rows = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete reference")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete reference")?
                .rows_affected(),
        };
        Ok(rows > 0)
    }

    async fn increment_click(&self, id: i64) -> Result<bool> {
        let sql = "UPDATE references_links SET click_count = click_count + 1 WHERE id = ?";
        let rows = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to record click")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to record click")?
                .rows_affected(),
        };
        Ok(rows > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_reference_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Reference>> {
    let row = sqlx::query(&select_references("WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get reference")?;

    row.as_ref().map(row_to_reference_sqlite).transpose()
}

fn row_to_reference_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Reference> {
    Ok(Reference {
        id: row.get("id"),
        title: row.get("title"),
        url: row.get("url"),
        description: row.get("description"),
        thumbnail_url: row.get("thumbnail_url"),
        logo_url: row.get("logo_url"),
        categories: from_json_text(row.get("categories"))?,
        click_count: row.get("click_count"),
        sort_order: row.get("sort_order"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_reference_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Reference>> {
    let row = sqlx::query(&select_references("WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get reference")?;

    row.as_ref().map(row_to_reference_mysql).transpose()
}

fn row_to_reference_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Reference> {
    Ok(Reference {
        id: row.get("id"),
        title: row.get("title"),
        url: row.get("url"),
        description: row.get("description"),
        thumbnail_url: row.get("thumbnail_url"),
        logo_url: row.get("logo_url"),
        categories: from_json_text(row.get("categories"))?,
        click_count: row.get("click_count"),
        sort_order: row.get("sort_order"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> SqlxReferenceRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxReferenceRepository::new(pool)
    }

    fn reference(title: &str, categories: &[&str], sort_order: i32) -> Reference {
        let mut reference = Reference::new(title.into(), format!("https://{}.example.com", title), None);
        reference.categories = categories.iter().map(|c| c.to_string()).collect();
        reference.sort_order = sort_order;
        reference
    }

    #[tokio::test]
    async fn test_create_list_and_order() {
        let repo = setup().await;
        repo.create(&reference("b", &["design"], 2)).await.unwrap();
        repo.create(&reference("a", &["design", "fonts"], 1)).await.unwrap();
        repo.create(&reference("c", &["code"], 0)).await.unwrap();

        let all = repo.list(None).await.unwrap();
        let titles: Vec<&str> = all.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "a", "b"]);

        let design = repo.list(Some("design")).await.unwrap();
        assert_eq!(design.len(), 2);
        assert_eq!(design[0].categories, vec!["design", "fonts"]);

        assert_eq!(repo.list(Some("fonts")).await.unwrap().len(), 1);
        assert!(repo.list(Some("missing")).await.unwrap().is_empty());
        assert_eq!(repo.list(Some("  ")).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_click_delete() {
        let repo = setup().await;
        let mut created = repo.create(&reference("r", &[], 0)).await.unwrap();

        created.url = "https://new.example.com".into();
        let updated = repo.update(&created).await.unwrap();
        assert_eq!(updated.url, "https://new.example.com");

        assert!(repo.increment_click(created.id).await.unwrap());
        assert!(repo.increment_click(created.id).await.unwrap());
        assert_eq!(repo.get_by_id(created.id).await.unwrap().unwrap().click_count, 2);
        assert!(!repo.increment_click(999).await.unwrap());

        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }
}
