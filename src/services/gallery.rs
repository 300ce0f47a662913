//! Gallery service
//!
//! Gallery items plus the AI analysis around them: analyzing on demand,
//! backfilling items that were never analyzed and finding similar items by
//! embedding.

use crate::analysis::{cosine_similarity, normalize_tags, AnalysisError, AnalysisResult, ImageAnalyzer};
use crate::db::repositories::{GalleryRepository, UserRepository};
use crate::models::{
    CreateGalleryItemInput, GalleryFilter, GalleryItem, ListParams, MigrationReport, PagedResult,
    SimilarItem, UpdateGalleryItemInput, User,
};
use crate::permissions::{self, Principal};
use crate::storage::ObjectStorage;
use anyhow::Context;
use std::sync::Arc;

/// Upper bound on editor tags per item
const MAX_EDITOR_TAGS: usize = 30;

/// Items analyzed per backfill call
pub const MAX_MIGRATION_BATCH: i64 = 100;

/// Error types for gallery service operations
#[derive(Debug, thiserror::Error)]
pub enum GalleryServiceError {
    #[error("Gallery item not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Gallery service
pub struct GalleryService {
    repo: Arc<dyn GalleryRepository>,
    user_repo: Arc<dyn UserRepository>,
    storage: Arc<dyn ObjectStorage>,
    analyzer: Option<Arc<ImageAnalyzer>>,
}

impl GalleryService {
    /// `analyzer` is `None` when no AI service is configured
    pub fn new(
        repo: Arc<dyn GalleryRepository>,
        user_repo: Arc<dyn UserRepository>,
        storage: Arc<dyn ObjectStorage>,
        analyzer: Option<Arc<ImageAnalyzer>>,
    ) -> Self {
        Self {
            repo,
            user_repo,
            storage,
            analyzer,
        }
    }

    pub fn analysis_enabled(&self) -> bool {
        self.analyzer.is_some()
    }

    fn analyzer(&self) -> Result<&ImageAnalyzer, GalleryServiceError> {
        self.analyzer
            .as_deref()
            .ok_or(GalleryServiceError::Analysis(AnalysisError::Disabled))
    }

    /// Create an item, analyzing it first when asked to.
    ///
    /// A failed analysis stores nothing.
    pub async fn create(
        &self,
        author: &User,
        input: CreateGalleryItemInput,
    ) -> Result<GalleryItem, GalleryServiceError> {
        if !permissions::can_create_content(author.role) {
            return Err(GalleryServiceError::Forbidden(
                "Cannot add gallery items".into(),
            ));
        }
        let image_url = input.image_url.trim().to_string();
        if image_url.is_empty() {
            return Err(GalleryServiceError::ValidationError(
                "Image URL cannot be empty".into(),
            ));
        }

        let analysis = if input.analyze {
            Some(self.analyzer()?.analyze_url(&image_url).await?)
        } else {
            None
        };

        let mut item = GalleryItem::new(input.title.trim().to_string(), image_url, Some(author.id));
        item.description = non_blank(input.description);
        item.tags = normalize_tags(input.tags, MAX_EDITOR_TAGS);
        item.storage_key = self.storage.key_from_url(&item.image_url);
        item.width = input.width;
        item.height = input.height;

        let item = self
            .repo
            .create(&item)
            .await
            .context("Failed to create gallery item")?;
        tracing::info!(item_id = item.id, "Created gallery item");

        match analysis {
            Some(result) => self.store_analysis(item.id, &result).await,
            None => Ok(item),
        }
    }

    pub async fn get(&self, id: i64) -> Result<GalleryItem, GalleryServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get gallery item")?
            .ok_or_else(|| GalleryServiceError::NotFound(id.to_string()))
    }

    pub async fn list(
        &self,
        filter: &GalleryFilter,
        params: &ListParams,
    ) -> Result<PagedResult<GalleryItem>, GalleryServiceError> {
        let items = self
            .repo
            .list(filter, params.offset(), params.limit())
            .await
            .context("Failed to list gallery items")?;
        let total = self
            .repo
            .count(filter)
            .await
            .context("Failed to count gallery items")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Update editor fields. Replacing the image drops the stored object
    /// the item pointed at before, unless another item still uses it.
    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: UpdateGalleryItemInput,
    ) -> Result<GalleryItem, GalleryServiceError> {
        let mut item = self.get(id).await?;
        self.check_can_modify(actor, &item).await?;

        if let Some(title) = input.title {
            item.title = title.trim().to_string();
        }
        if input.description.is_some() {
            item.description = non_blank(input.description);
        }
        if let Some(tags) = input.tags {
            item.tags = normalize_tags(tags, MAX_EDITOR_TAGS);
        }

        let mut replaced_key = None;
        if let Some(image_url) = input.image_url {
            let image_url = image_url.trim().to_string();
            if image_url.is_empty() {
                return Err(GalleryServiceError::ValidationError(
                    "Image URL cannot be empty".into(),
                ));
            }
            if image_url != item.image_url {
                let new_key = self.storage.key_from_url(&image_url);
                if item.storage_key != new_key {
                    replaced_key = item.storage_key.take();
                }
                item.storage_key = new_key;
                item.image_url = image_url;
            }
        }

        let item = self
            .repo
            .update(&item)
            .await
            .context("Failed to update gallery item")?;

        if let Some(key) = replaced_key {
            self.release_object(&key).await?;
        }
        Ok(item)
    }

    /// Delete an item, and its stored object once no other item uses it
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), GalleryServiceError> {
        let item = self.get(id).await?;
        self.check_can_modify(actor, &item).await?;

        self.repo
            .delete(id)
            .await
            .context("Failed to delete gallery item")?;
        tracing::info!(actor_id = actor.id, item_id = id, "Deleted gallery item");

        if let Some(key) = item.storage_key.as_deref() {
            self.release_object(key).await?;
        }
        Ok(())
    }

    /// Analyze an image without storing anything
    pub async fn analyze_url(&self, image_url: &str) -> Result<AnalysisResult, GalleryServiceError> {
        let image_url = image_url.trim();
        if image_url.is_empty() {
            return Err(GalleryServiceError::ValidationError(
                "Image URL cannot be empty".into(),
            ));
        }
        Ok(self.analyzer()?.analyze_url(image_url).await?)
    }

    /// Analyze an item's image and store the AI fields on it
    pub async fn analyze_item(&self, actor: &User, id: i64) -> Result<GalleryItem, GalleryServiceError> {
        let item = self.get(id).await?;
        self.check_can_modify(actor, &item).await?;

        let result = self.analyzer()?.analyze_url(&item.image_url).await?;
        self.store_analysis(item.id, &result).await
    }

    /// Analyze up to `limit` items that have no embedding yet.
    ///
    /// Failures are counted, logged and stamped on the item; they do not
    /// stop the batch, and stamped items are retried after the others.
    pub async fn migrate(&self, actor: &User, limit: i64) -> Result<MigrationReport, GalleryServiceError> {
        if !permissions::can_manage_site(actor.role) {
            return Err(GalleryServiceError::Forbidden(
                "Cannot run the analysis backfill".into(),
            ));
        }
        let analyzer = self.analyzer()?;

        let items = self
            .repo
            .list_missing_analysis(limit.clamp(1, MAX_MIGRATION_BATCH))
            .await
            .context("Failed to list items missing analysis")?;

        let mut report = MigrationReport::default();
        for item in items {
            let outcome = match analyzer.analyze_url(&item.image_url).await {
                Ok(result) => self
                    .repo
                    .update_analysis(item.id, &result)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match outcome {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    tracing::warn!(item_id = item.id, "Analysis backfill failed: {}", e);
                    report.failed += 1;
                    self.repo
                        .record_analysis_failure(item.id)
                        .await
                        .context("Failed to record analysis failure")?;
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            failed = report.failed,
            "Analysis backfill finished"
        );
        Ok(report)
    }

    /// Items closest to `id` by cosine similarity of their embeddings
    pub async fn similar(&self, id: i64, limit: usize) -> Result<Vec<SimilarItem>, GalleryServiceError> {
        let item = self.get(id).await?;
        let Some(query) = item.embedding.as_deref().filter(|e| !e.is_empty()) else {
            return Err(GalleryServiceError::ValidationError(
                "Gallery item has not been analyzed".into(),
            ));
        };

        let candidates = self
            .repo
            .list_with_embeddings()
            .await
            .context("Failed to load embeddings")?;

        let mut scored: Vec<SimilarItem> = candidates
            .into_iter()
            .filter(|c| c.id != item.id)
            .filter_map(|c| {
                let embedding = c.embedding.as_deref()?;
                if embedding.len() != query.len() {
                    return None;
                }
                let score = cosine_similarity(query, embedding);
                Some(SimilarItem { item: c, score })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.item.id.cmp(&b.item.id)));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn store_analysis(
        &self,
        id: i64,
        result: &AnalysisResult,
    ) -> Result<GalleryItem, GalleryServiceError> {
        self.repo
            .update_analysis(id, result)
            .await
            .context("Failed to store analysis")?;
        self.get(id).await
    }

    /// Delete a stored object nothing references any more
    async fn release_object(&self, key: &str) -> Result<(), GalleryServiceError> {
        let users = self
            .repo
            .count_by_storage_key(key)
            .await
            .context("Failed to check stored object references")?;
        if users > 0 {
            tracing::debug!(key, users, "Stored object still in use, keeping it");
            return Ok(());
        }
        if let Err(e) = self.storage.delete(key).await {
            tracing::warn!(key, "Failed to delete stored object: {}", e);
        }
        Ok(())
    }

    async fn check_can_modify(&self, actor: &User, item: &GalleryItem) -> Result<(), GalleryServiceError> {
        let owner_role = match item.author_id {
            Some(author_id) => self
                .user_repo
                .get_by_id(author_id)
                .await
                .context("Failed to load item author")?
                .map(|u| u.role),
            None => None,
        };
        if permissions::can_modify_content(Principal::from(actor), item.author_id, owner_role) {
            Ok(())
        } else {
            Err(GalleryServiceError::Forbidden(
                "Cannot modify this gallery item".into(),
            ))
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
