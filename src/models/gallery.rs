//! Gallery item model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisResult, EmbeddingSource, ImageCategory};

/// A stored image with editor metadata and AI-derived fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryItem {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Editor-assigned tags
    #[serde(default)]
    pub tags: Vec<String>,
    pub image_url: String,
    /// Key in object storage when the file was uploaded here
    pub storage_key: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub ai_category: Option<ImageCategory>,
    pub ai_description: Option<String>,
    pub ai_visual_detail: Option<String>,
    #[serde(default)]
    pub ai_tags: Vec<String>,
    /// Never sent over the wire; only used for similarity search
    #[serde(skip_serializing, default)]
    pub embedding: Option<Vec<f32>>,
    pub embedding_source: Option<EmbeddingSource>,
    pub author_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GalleryItem {
    pub fn new(title: String, image_url: String, author_id: Option<i64>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            title,
            description: None,
            tags: Vec::new(),
            image_url,
            storage_key: None,
            width: None,
            height: None,
            ai_category: None,
            ai_description: None,
            ai_visual_detail: None,
            ai_tags: Vec::new(),
            embedding: None,
            embedding_source: None,
            author_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_analyzed(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Copy an analysis result onto the item
    pub fn apply_analysis(&mut self, result: AnalysisResult) {
        self.ai_category = Some(result.category);
        self.ai_description = Some(result.summary);
        self.ai_visual_detail = Some(result.visual_detail);
        self.ai_tags = result.tags;
        self.embedding = Some(result.embedding);
        self.embedding_source = Some(result.embedding_source);
    }

    /// Editor tags followed by AI tags, without duplicates
    pub fn all_tags(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for tag in self.tags.iter().chain(self.ai_tags.iter()) {
            if !out.contains(&tag.as_str()) {
                out.push(tag);
            }
        }
        out
    }
}

/// Input for creating a gallery item
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateGalleryItemInput {
    pub title: String,
    pub image_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    /// Run the analysis pipeline right after creating
    #[serde(default)]
    pub analyze: bool,
}

/// Input for updating a gallery item
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGalleryItemInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub image_url: Option<String>,
}

/// Filters for gallery listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct GalleryFilter {
    /// Matches editor tags or AI tags
    pub tag: Option<String>,
    pub category: Option<ImageCategory>,
    pub author_id: Option<i64>,
}

/// Outcome of a backfill run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub processed: usize,
    pub failed: usize,
}

/// A gallery item with its similarity to the query item
#[derive(Debug, Clone, Serialize)]
pub struct SimilarItem {
    #[serde(flatten)]
    pub item: GalleryItem,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            category: ImageCategory::Landscape,
            summary: "A lake".into(),
            visual_detail: "Blue water under mountains".into(),
            tags: vec!["lake".into(), "mountain".into()],
            embedding: vec![0.1, 0.2],
            embedding_source: EmbeddingSource::Text,
        }
    }

    #[test]
    fn test_apply_analysis() {
        let mut item = GalleryItem::new("Lake".into(), "/uploads/a.png".into(), Some(1));
        assert!(!item.is_analyzed());
        item.apply_analysis(analysis());
        assert!(item.is_analyzed());
        assert_eq!(item.ai_category, Some(ImageCategory::Landscape));
        assert_eq!(item.ai_description.as_deref(), Some("A lake"));
    }

    #[test]
    fn test_embedding_not_serialized() {
        let mut item = GalleryItem::new("Lake".into(), "/uploads/a.png".into(), None);
        item.apply_analysis(analysis());
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("embedding").is_none());
        assert_eq!(json["embedding_source"], "text");
        assert_eq!(json["ai_category"], "landscape");
    }

    #[test]
    fn test_all_tags_dedupes() {
        let mut item = GalleryItem::new("x".into(), "u".into(), None);
        item.tags = vec!["lake".into(), "trip".into()];
        item.ai_tags = vec!["lake".into(), "water".into()];
        assert_eq!(item.all_tags(), vec!["lake", "trip", "water"]);
    }
}
