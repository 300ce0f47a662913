//! Banner repository
//!
//! Database operations for homepage banners.

use crate::db::{Backend, DynDatabasePool};
use crate::models::Banner;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Banner repository trait
#[async_trait]
pub trait BannerRepository: Send + Sync {
    async fn create(&self, banner: &Banner) -> Result<Banner>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Banner>>;

    /// Every banner by sort_order
    async fn list_all(&self) -> Result<Vec<Banner>>;

    /// Active banners whose window contains `now`, by sort_order
    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Banner>>;

    async fn update(&self, banner: &Banner) -> Result<Banner>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based banner repository implementation
pub struct SqlxBannerRepository {
    pool: DynDatabasePool,
}

impl SqlxBannerRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BannerRepository> {
        Arc::new(Self::new(pool))
    }
}

const BANNER_COLUMNS: &str = "id, title, subtitle, image_url, link_url, sort_order, is_active, \
     starts_at, ends_at, created_at, updated_at";

const INSERT_BANNER: &str = r#"
    INSERT INTO banners (title, subtitle, image_url, link_url, sort_order, is_active,
                         starts_at, ends_at, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_BANNER: &str = r#"
    UPDATE banners
    SET title = ?, subtitle = ?, image_url = ?, link_url = ?, sort_order = ?, is_active = ?,
        starts_at = ?, ends_at = ?, updated_at = ?
    WHERE id = ?
"#;

const ORDER_CLAUSE: &str = "ORDER BY sort_order ASC, id ASC";

fn select_banners(filter: &str) -> String {
    format!("SELECT {} FROM banners {}", BANNER_COLUMNS, filter)
}

#[async_trait]
impl BannerRepository for SqlxBannerRepository {
    async fn create(&self, banner: &Banner) -> Result<Banner> {
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(INSERT_BANNER)
                .bind(&banner.title)
                .bind(&banner.subtitle)
                .bind(&banner.image_url)
                .bind(&banner.link_url)
                .bind(banner.sort_order)
                .bind(banner.is_active)
                .bind(banner.starts_at)
                .bind(banner.ends_at)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create banner")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(INSERT_BANNER)
                .bind(&banner.title)
                .bind(&banner.subtitle)
                .bind(&banner.image_url)
                .bind(&banner.link_url)
                .bind(banner.sort_order)
                .bind(banner.is_active)
                .bind(banner.starts_at)
                .bind(banner.ends_at)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create banner")?
                .last_insert_id() as i64,
        };

        Ok(Banner {
            id,
            created_at: now,
            updated_at: now,
            ..banner.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Banner>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_banner_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_banner_mysql(pool, id).await,
        }
    }

    async fn list_all(&self) -> Result<Vec<Banner>> {
        let sql = select_banners(ORDER_CLAUSE);
        match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await
                .context("Failed to list banners")?
                .iter()
                .map(row_to_banner_sqlite)
                .collect(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await
                .context("Failed to list banners")?
                .iter()
                .map(row_to_banner_mysql)
                .collect(),
        }
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Banner>> {
        let sql = select_banners(&format!(
            "WHERE is_active = ? \
             AND (starts_at IS NULL OR starts_at <= ?) \
             AND (ends_at IS NULL OR ends_at > ?) {}",
            ORDER_CLAUSE
        ));
        let banners: Vec<Banner> = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(true)
                .bind(now)
                .bind(now)
                .fetch_all(pool)
                .await
                .context("Failed to list active banners")?
                .iter()
                .map(row_to_banner_sqlite)
                .collect::<Result<_>>()?,
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(true)
                .bind(now)
                .bind(now)
                .fetch_all(pool)
                .await
                .context("Failed to list active banners")?
                .iter()
                .map(row_to_banner_mysql)
                .collect::<Result<_>>()?,
        };
        // Text timestamps in SQLite compare lexically; check the window again
        Ok(banners.into_iter().filter(|b| b.is_live_at(now)).collect())
    }

    async fn update(&self, banner: &Banner) -> Result<Banner> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(UPDATE_BANNER)
                    .bind(&banner.title)
                    .bind(&banner.subtitle)
                    .bind(&banner.image_url)
                    .bind(&banner.link_url)
                    .bind(banner.sort_order)
                    .bind(banner.is_active)
                    .bind(banner.starts_at)
                    .bind(banner.ends_at)
                    .bind(Utc::now())
                    .bind(banner.id)
                    .execute(pool)
                    .await
                    .context("Failed to update banner")?;
                get_banner_sqlite(pool, banner.id).await
            }
            Backend::Mysql(pool) => {
                sqlx::query(UPDATE_BANNER)
                    .bind(&banner.title)
                    .bind(&banner.subtitle)
                    .bind(&banner.image_url)
                    .bind(&banner.link_url)
                    .bind(banner.sort_order)
                    .bind(banner.is_active)
                    .bind(banner.starts_at)
                    .bind(banner.ends_at)
                    .bind(Utc::now())
                    .bind(banner.id)
                    .execute(pool)
                    .await
                    .context("Failed to update banner")?;
                get_banner_mysql(pool, banner.id).await
            }
        }?
        .ok_or_else(|| anyhow::anyhow!("Banner not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM banners WHERE id = ?";
        let rows = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete banner")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete banner")?
                .rows_affected(),
        };
        Ok(rows > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_banner_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Banner>> {
    let row = sqlx::query(&select_banners("WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get banner")?;

    row.as_ref().map(row_to_banner_sqlite).transpose()
}

fn row_to_banner_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Banner> {
    Ok(Banner {
        id: row.get("id"),
        title: row.get("title"),
        subtitle: row.get("subtitle"),
        image_url: row.get("image_url"),
        link_url: row.get("link_url"),
        sort_order: row.get("sort_order"),
        is_active: row.get("is_active"),
        starts_at: row.get("starts_at"),
        ends_at: row.get("ends_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_banner_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Banner>> {
    let row = sqlx::query(&select_banners("WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get banner")?;

    row.as_ref().map(row_to_banner_mysql).transpose()
}

fn row_to_banner_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Banner> {
    Ok(Banner {
        id: row.get("id"),
        title: row.get("title"),
        subtitle: row.get("subtitle"),
        image_url: row.get("image_url"),
        link_url: row.get("link_url"),
        sort_order: row.get("sort_order"),
        is_active: row.get("is_active"),
        starts_at: row.get("starts_at"),
        ends_at: row.get("ends_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup() -> SqlxBannerRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxBannerRepository::new(pool)
    }

    #[tokio::test]
    async fn test_list_active_respects_flag_and_window() {
        let repo = setup().await;
        let now = Utc::now();

        let mut always = Banner::new("always".into(), "/uploads/a.png".into());
        always.sort_order = 2;
        repo.create(&always).await.unwrap();

        let mut windowed = Banner::new("windowed".into(), "/uploads/b.png".into());
        windowed.sort_order = 1;
        windowed.starts_at = Some(now - Duration::hours(1));
        windowed.ends_at = Some(now + Duration::hours(1));
        repo.create(&windowed).await.unwrap();

        let mut future = Banner::new("future".into(), "/uploads/c.png".into());
        future.starts_at = Some(now + Duration::days(1));
        repo.create(&future).await.unwrap();

        let mut expired = Banner::new("expired".into(), "/uploads/d.png".into());
        expired.ends_at = Some(now - Duration::minutes(1));
        repo.create(&expired).await.unwrap();

        let mut inactive = Banner::new("inactive".into(), "/uploads/e.png".into());
        inactive.is_active = false;
        repo.create(&inactive).await.unwrap();

        let active = repo.list_active(now).await.unwrap();
        let titles: Vec<&str> = active.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["windowed", "always"]);

        assert_eq!(repo.list_all().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = setup().await;
        let mut banner = repo
            .create(&Banner::new("b".into(), "/uploads/b.png".into()))
            .await
            .unwrap();

        banner.is_active = false;
        banner.subtitle = Some("sub".into());
        let updated = repo.update(&banner).await.unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.subtitle.as_deref(), Some("sub"));

        assert!(repo.delete(banner.id).await.unwrap());
        assert!(repo.get_by_id(banner.id).await.unwrap().is_none());
    }
}
