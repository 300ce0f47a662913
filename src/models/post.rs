//! Blog post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Document;

/// A blog post whose body is a rich-text document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Unique identifier
    pub id: i64,
    /// URL-friendly slug (unique)
    pub slug: String,
    pub title: String,
    /// Editor document tree
    pub content: Document,
    /// HTML rendered from `content`
    pub content_html: String,
    /// Plain-text summary derived from `content`
    pub excerpt: String,
    /// First image of the document unless set explicitly
    pub thumbnail: Option<String>,
    pub category: Option<String>,
    pub status: PostStatus,
    /// Set on first publish, kept across later edits
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub scrap_count: i64,
    /// `None` once the author's account is deleted
    pub author_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn new(slug: String, title: String, content: Document, author_id: Option<i64>) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by database
            slug,
            title,
            content,
            content_html: String::new(),
            excerpt: String::new(),
            thumbnail: None,
            category: None,
            status: PostStatus::Draft,
            published_at: None,
            view_count: 0,
            scrap_count: 0,
            author_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }
}

/// Post publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    /// Not visible to the public
    #[default]
    Draft,
    /// Visible to the public
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Some(PostStatus::Draft),
            "published" => Some(PostStatus::Published),
            _ => None,
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for creating a post
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    /// Generated from the title when missing or blank
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub content: Option<Document>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// `published` publishes immediately
    #[serde(default)]
    pub status: Option<PostStatus>,
}

/// Input for updating a post; unset fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<Document>,
    pub category: Option<String>,
    pub thumbnail: Option<String>,
}

impl UpdatePostInput {
    pub fn has_changes(&self) -> bool {
        self.title.is_some()
            || self.slug.is_some()
            || self.content.is_some()
            || self.category.is_some()
            || self.thumbnail.is_some()
    }
}

/// Filters for post listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub category: Option<String>,
    pub author_id: Option<i64>,
}

impl PostFilter {
    pub fn published() -> Self {
        Self {
            status: Some(PostStatus::Published),
            ..Self::default()
        }
    }
}

/// Result of toggling a bookmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScrapToggle {
    /// Whether the post is bookmarked after the toggle
    pub scrapped: bool,
    pub scrap_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_post_is_draft() {
        let post = Post::new("hello".into(), "Hello".into(), Document::empty(), Some(1));
        assert_eq!(post.status, PostStatus::Draft);
        assert!(post.published_at.is_none());
        assert!(!post.is_published());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(PostStatus::parse("Published"), Some(PostStatus::Published));
        assert_eq!(PostStatus::parse("draft"), Some(PostStatus::Draft));
        assert_eq!(PostStatus::parse("archived"), None);
    }

    #[test]
    fn test_create_input_accepts_document() {
        let input: CreatePostInput = serde_json::from_value(serde_json::json!({
            "title": "T",
            "content": { "type": "doc", "content": [{ "type": "paragraph" }] }
        }))
        .unwrap();
        assert_eq!(input.content.unwrap().blocks().len(), 1);
        assert!(input.slug.is_none());
    }

    #[test]
    fn test_update_has_changes() {
        assert!(!UpdatePostInput::default().has_changes());
        let update = UpdatePostInput {
            category: Some("travel".into()),
            ..Default::default()
        };
        assert!(update.has_changes());
    }

    #[test]
    fn test_filters_are_hashable() {
        use std::collections::HashSet;

        let filters: HashSet<PostFilter> = [
            PostFilter::published(),
            PostFilter::published(),
            PostFilter::default(),
        ]
        .into_iter()
        .collect();
        assert_eq!(filters.len(), 2);
    }
}
