//! Reference link model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A curated external link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: i64,
    pub title: String,
    /// Target URL (http or https)
    pub url: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub logo_url: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub click_count: i64,
    /// Lower sorts first
    #[serde(default)]
    pub sort_order: i32,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reference {
    pub fn new(title: String, url: String, created_by: Option<i64>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            title,
            url,
            description: None,
            thumbnail_url: None,
            logo_url: None,
            categories: Vec::new(),
            click_count: 0,
            sort_order: 0,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn in_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c.eq_ignore_ascii_case(category))
    }
}

/// Input for creating a reference
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateReferenceInput {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub sort_order: i32,
}

/// Input for updating a reference
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateReferenceInput {
    pub title: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub logo_url: Option<String>,
    pub categories: Option<Vec<String>>,
    pub sort_order: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_category_ignores_case() {
        let mut reference = Reference::new("Docs".into(), "https://docs.rs".into(), None);
        reference.categories = vec!["Rust".into(), "docs".into()];
        assert!(reference.in_category("rust"));
        assert!(reference.in_category("DOCS"));
        assert!(!reference.in_category("design"));
    }
}
