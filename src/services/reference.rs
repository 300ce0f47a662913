//! Reference service
//!
//! The curated link directory. Only site managers edit it; anyone may read
//! it and every outbound click is counted.

use crate::db::repositories::ReferenceRepository;
use crate::models::{CreateReferenceInput, Reference, UpdateReferenceInput, User};
use crate::permissions;
use anyhow::Context;
use reqwest::Url;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Error types for reference service operations
#[derive(Debug, thiserror::Error)]
pub enum ReferenceServiceError {
    #[error("Reference not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Reference service
pub struct ReferenceService {
    repo: Arc<dyn ReferenceRepository>,
}

impl ReferenceService {
    pub fn new(repo: Arc<dyn ReferenceRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(
        &self,
        actor: &User,
        input: CreateReferenceInput,
    ) -> Result<Reference, ReferenceServiceError> {
        check_can_manage(actor)?;

        let title = required_title(&input.title)?;
        let url = validate_url(&input.url)?;

        let mut reference = Reference::new(title, url, Some(actor.id));
        reference.description = non_blank(input.description);
        reference.thumbnail_url = non_blank(input.thumbnail_url);
        reference.logo_url = non_blank(input.logo_url);
        reference.categories = normalize_categories(input.categories);
        reference.sort_order = input.sort_order;

        let reference = self
            .repo
            .create(&reference)
            .await
            .context("Failed to create reference")?;
        tracing::info!(reference_id = reference.id, "Created reference");
        Ok(reference)
    }

    pub async fn get(&self, id: i64) -> Result<Reference, ReferenceServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get reference")?
            .ok_or_else(|| ReferenceServiceError::NotFound(id.to_string()))
    }

    /// All references, or those tagged with `category`
    pub async fn list(&self, category: Option<&str>) -> Result<Vec<Reference>, ReferenceServiceError> {
        Ok(self
            .repo
            .list(category)
            .await
            .context("Failed to list references")?)
    }

    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: UpdateReferenceInput,
    ) -> Result<Reference, ReferenceServiceError> {
        check_can_manage(actor)?;
        let mut reference = self.get(id).await?;

        if let Some(title) = input.title {
            reference.title = required_title(&title)?;
        }
        if let Some(url) = input.url {
            reference.url = validate_url(&url)?;
        }
        if input.description.is_some() {
            reference.description = non_blank(input.description);
        }
        if input.thumbnail_url.is_some() {
            reference.thumbnail_url = non_blank(input.thumbnail_url);
        }
        if input.logo_url.is_some() {
            reference.logo_url = non_blank(input.logo_url);
        }
        if let Some(categories) = input.categories {
            reference.categories = normalize_categories(categories);
        }
        if let Some(sort_order) = input.sort_order {
            reference.sort_order = sort_order;
        }

        Ok(self
            .repo
            .update(&reference)
            .await
            .context("Failed to update reference")?)
    }

    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), ReferenceServiceError> {
        check_can_manage(actor)?;
        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete reference")?;
        if !deleted {
            return Err(ReferenceServiceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Count an outbound click
    pub async fn record_click(&self, id: i64) -> Result<(), ReferenceServiceError> {
        let found = self
            .repo
            .increment_click(id)
            .await
            .context("Failed to record click")?;
        if !found {
            return Err(ReferenceServiceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Every category in use, sorted
    pub async fn categories(&self) -> Result<Vec<String>, ReferenceServiceError> {
        let references = self.list(None).await?;
        let categories: BTreeSet<String> = references
            .into_iter()
            .flat_map(|r| r.categories)
            .collect();
        Ok(categories.into_iter().collect())
    }
}

fn check_can_manage(actor: &User) -> Result<(), ReferenceServiceError> {
    if permissions::can_manage_site(actor.role) {
        Ok(())
    } else {
        Err(ReferenceServiceError::Forbidden(
            "Cannot manage references".into(),
        ))
    }
}

fn required_title(title: &str) -> Result<String, ReferenceServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ReferenceServiceError::ValidationError(
            "Title cannot be empty".into(),
        ));
    }
    Ok(title.to_string())
}

/// Absolute http(s) URL
fn validate_url(url: &str) -> Result<String, ReferenceServiceError> {
    let url = url.trim();
    let parsed = Url::parse(url)
        .map_err(|e| ReferenceServiceError::ValidationError(format!("Invalid URL: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ReferenceServiceError::ValidationError(
            "URL must start with http:// or https://".into(),
        ));
    }
    Ok(url.to_string())
}

/// Trimmed, without blanks or case-insensitive repeats, first spelling kept
fn normalize_categories(categories: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for category in categories {
        let category = category.trim();
        if category.is_empty() || out.iter().any(|c| c.eq_ignore_ascii_case(category)) {
            continue;
        }
        out.push(category.to_string());
    }
    out
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxReferenceRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;

    async fn setup() -> (ReferenceService, User, User) {
        let pool = create_test_pool()
            .await
            .expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let manager = users
            .create(&User::new("sub@example.com".into(), "sub".into(), UserRole::SubAdmin))
            .await
            .unwrap();
        let editor = users
            .create(&User::new("ed@example.com".into(), "ed".into(), UserRole::Editor))
            .await
            .unwrap();

        (
            ReferenceService::new(SqlxReferenceRepository::boxed(pool)),
            manager,
            editor,
        )
    }

    fn input(title: &str, url: &str, categories: &[&str]) -> CreateReferenceInput {
        CreateReferenceInput {
            title: title.into(),
            url: url.into(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://docs.rs").is_ok());
        assert!(validate_url(" http://example.com/path?q=1 ").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("javascript:alert(1)").is_err());
        assert!(validate_url("example.com").is_err());
    }

    #[test]
    fn test_normalize_categories() {
        let categories = normalize_categories(vec![
            " Design ".into(),
            "design".into(),
            "".into(),
            "Fonts".into(),
        ]);
        assert_eq!(categories, vec!["Design", "Fonts"]);
    }

    #[tokio::test]
    async fn test_create_requires_manager_and_valid_url() {
        let (service, manager, editor) = setup().await;

        let result = service
            .create(&editor, input("Docs", "https://docs.rs", &[]))
            .await;
        assert!(matches!(result, Err(ReferenceServiceError::Forbidden(_))));

        let result = service.create(&manager, input("Docs", "docs.rs", &[])).await;
        assert!(matches!(result, Err(ReferenceServiceError::ValidationError(_))));

        let created = service
            .create(&manager, input("Docs", "https://docs.rs", &["rust"]))
            .await
            .unwrap();
        assert_eq!(created.created_by, Some(manager.id));
    }

    #[tokio::test]
    async fn test_categories_are_distinct_and_sorted() {
        let (service, manager, _) = setup().await;
        service
            .create(&manager, input("A", "https://a.example.com", &["typography", "design"]))
            .await
            .unwrap();
        service
            .create(&manager, input("B", "https://b.example.com", &["design", "color"]))
            .await
            .unwrap();

        assert_eq!(
            service.categories().await.unwrap(),
            vec!["color", "design", "typography"]
        );
        assert_eq!(service.list(Some("design")).await.unwrap().len(), 2);
        assert_eq!(service.list(Some("color")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_click_and_delete() {
        let (service, manager, _) = setup().await;
        let created = service
            .create(&manager, input("A", "https://a.example.com", &[]))
            .await
            .unwrap();

        let updated = service
            .update(
                &manager,
                created.id,
                UpdateReferenceInput {
                    url: Some("https://b.example.com".into()),
                    sort_order: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.url, "https://b.example.com");
        assert_eq!(updated.sort_order, 5);

        service.record_click(created.id).await.unwrap();
        assert_eq!(service.get(created.id).await.unwrap().click_count, 1);
        assert!(matches!(
            service.record_click(999).await,
            Err(ReferenceServiceError::NotFound(_))
        ));

        service.delete(&manager, created.id).await.unwrap();
        assert!(matches!(
            service.delete(&manager, created.id).await,
            Err(ReferenceServiceError::NotFound(_))
        ));
    }
}
