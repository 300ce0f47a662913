//! Banner service
//!
//! Homepage banners with an optional display window. The live set is read
//! on every page view, so it is cached briefly and dropped on any write.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::BannerRepository;
use crate::models::{Banner, CreateBannerInput, UpdateBannerInput, User};
use crate::permissions;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Short so that window boundaries show up promptly
const ACTIVE_BANNERS_CACHE_TTL_SECS: u64 = 60;

const CACHE_KEY_ACTIVE_BANNERS: &str = "banners:active";
const CACHE_PATTERN_BANNERS: &str = "banners:*";

/// Error types for banner service operations
#[derive(Debug, thiserror::Error)]
pub enum BannerServiceError {
    #[error("Banner not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Banner service
pub struct BannerService {
    repo: Arc<dyn BannerRepository>,
    cache: Arc<Cache>,
}

impl BannerService {
    pub fn new(repo: Arc<dyn BannerRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    pub async fn create(&self, actor: &User, input: CreateBannerInput) -> Result<Banner, BannerServiceError> {
        check_can_manage(actor)?;

        let mut banner = Banner::new(
            required(&input.title, "Title")?,
            required(&input.image_url, "Image URL")?,
        );
        banner.subtitle = non_blank(input.subtitle);
        banner.link_url = non_blank(input.link_url);
        banner.sort_order = input.sort_order;
        banner.is_active = input.is_active.unwrap_or(true);
        banner.starts_at = input.starts_at;
        banner.ends_at = input.ends_at;
        validate_window(&banner)?;

        let banner = self
            .repo
            .create(&banner)
            .await
            .context("Failed to create banner")?;
        tracing::info!(banner_id = banner.id, "Created banner");
        self.invalidate_cache().await?;
        Ok(banner)
    }

    pub async fn get(&self, id: i64) -> Result<Banner, BannerServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get banner")?
            .ok_or_else(|| BannerServiceError::NotFound(id.to_string()))
    }

    pub async fn list_all(&self) -> Result<Vec<Banner>, BannerServiceError> {
        Ok(self.repo.list_all().await.context("Failed to list banners")?)
    }

    /// Banners to show at `now`, by sort order
    pub async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Banner>, BannerServiceError> {
        if let Ok(Some(cached)) = self.cache.get::<Vec<Banner>>(CACHE_KEY_ACTIVE_BANNERS).await {
            return Ok(cached);
        }

        let banners = self
            .repo
            .list_active(now)
            .await
            .context("Failed to list active banners")?;

        let _ = self
            .cache
            .set(
                CACHE_KEY_ACTIVE_BANNERS,
                &banners,
                Duration::from_secs(ACTIVE_BANNERS_CACHE_TTL_SECS),
            )
            .await;
        Ok(banners)
    }

    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: UpdateBannerInput,
    ) -> Result<Banner, BannerServiceError> {
        check_can_manage(actor)?;
        let mut banner = self.get(id).await?;

        if let Some(title) = input.title {
            banner.title = required(&title, "Title")?;
        }
        if let Some(image_url) = input.image_url {
            banner.image_url = required(&image_url, "Image URL")?;
        }
        if input.subtitle.is_some() {
            banner.subtitle = non_blank(input.subtitle);
        }
        if input.link_url.is_some() {
            banner.link_url = non_blank(input.link_url);
        }
        if let Some(sort_order) = input.sort_order {
            banner.sort_order = sort_order;
        }
        if let Some(is_active) = input.is_active {
            banner.is_active = is_active;
        }
        if input.starts_at.is_some() {
            banner.starts_at = input.starts_at;
        }
        if input.ends_at.is_some() {
            banner.ends_at = input.ends_at;
        }
        validate_window(&banner)?;

        let banner = self
            .repo
            .update(&banner)
            .await
            .context("Failed to update banner")?;
        self.invalidate_cache().await?;
        Ok(banner)
    }

    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), BannerServiceError> {
        check_can_manage(actor)?;
        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete banner")?;
        if !deleted {
            return Err(BannerServiceError::NotFound(id.to_string()));
        }
        self.invalidate_cache().await?;
        Ok(())
    }

    async fn invalidate_cache(&self) -> Result<(), BannerServiceError> {
        self.cache
            .delete_pattern(CACHE_PATTERN_BANNERS)
            .await
            .context("Failed to invalidate banner cache")?;
        Ok(())
    }
}

fn check_can_manage(actor: &User) -> Result<(), BannerServiceError> {
    if permissions::can_manage_site(actor.role) {
        Ok(())
    } else {
        Err(BannerServiceError::Forbidden("Cannot manage banners".into()))
    }
}

fn validate_window(banner: &Banner) -> Result<(), BannerServiceError> {
    if let (Some(start), Some(end)) = (banner.starts_at, banner.ends_at) {
        if end <= start {
            return Err(BannerServiceError::ValidationError(
                "ends_at must be after starts_at".into(),
            ));
        }
    }
    Ok(())
}

fn required(value: &str, field: &str) -> Result<String, BannerServiceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BannerServiceError::ValidationError(format!(
            "{} cannot be empty",
            field
        )));
    }
    Ok(value.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::SqlxBannerRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;
    use chrono::Duration as ChronoDuration;

    async fn setup() -> BannerService {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        BannerService::new(
            SqlxBannerRepository::boxed(pool),
            Arc::new(Cache::Memory(MemoryCache::new())),
        )
    }

    fn manager() -> User {
        let mut user = User::new("sub@example.com".into(), "sub".into(), UserRole::SubAdmin);
        user.id = 1;
        user
    }

    fn input(title: &str) -> CreateBannerInput {
        CreateBannerInput {
            title: title.into(),
            image_url: "/uploads/banner.png".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_window_must_be_ordered() {
        let service = setup().await;
        let now = Utc::now();
        let mut request = input("Sale");
        request.starts_at = Some(now);
        request.ends_at = Some(now - ChronoDuration::hours(1));

        let result = service.create(&manager(), request).await;
        assert!(matches!(result, Err(BannerServiceError::ValidationError(_))));

        let banner = service.create(&manager(), input("Sale")).await.unwrap();
        let result = service
            .update(
                &manager(),
                banner.id,
                UpdateBannerInput {
                    starts_at: Some(now),
                    ends_at: Some(now),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(BannerServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_editor_cannot_manage() {
        let service = setup().await;
        let editor = User::new("ed@example.com".into(), "ed".into(), UserRole::Editor);
        let result = service.create(&editor, input("Nope")).await;
        assert!(matches!(result, Err(BannerServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_active_list_cached_and_invalidated() {
        let service = setup().await;
        let now = Utc::now();

        let mut second = input("second");
        second.sort_order = 2;
        service.create(&manager(), second).await.unwrap();
        let mut first = input("first");
        first.sort_order = 1;
        let first = service.create(&manager(), first).await.unwrap();
        let mut hidden = input("hidden");
        hidden.is_active = Some(false);
        service.create(&manager(), hidden).await.unwrap();

        let active = service.list_active(now).await.unwrap();
        let titles: Vec<&str> = active.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second"]);

        service
            .update(
                &manager(),
                first.id,
                UpdateBannerInput {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let active = service.list_active(now).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "second");

        assert_eq!(service.list_all().await.unwrap().len(), 3);

        service.delete(&manager(), first.id).await.unwrap();
        assert!(matches!(
            service.delete(&manager(), first.id).await,
            Err(BannerServiceError::NotFound(_))
        ));
    }
}
