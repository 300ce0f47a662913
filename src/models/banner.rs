//! Homepage banner model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A homepage banner, optionally limited to a time window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    pub id: i64,
    pub title: String,
    pub subtitle: Option<String>,
    pub image_url: String,
    pub link_url: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    pub is_active: bool,
    /// Not shown before this instant when set
    pub starts_at: Option<DateTime<Utc>>,
    /// Not shown from this instant on when set
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Banner {
    pub fn new(title: String, image_url: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            title,
            subtitle: None,
            image_url,
            link_url: None,
            sort_order: 0,
            is_active: true,
            starts_at: None,
            ends_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the banner should be shown at `now`
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at.map_or(true, |start| start <= now)
            && self.ends_at.map_or(true, |end| now < end)
    }
}

/// Input for creating a banner
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBannerInput {
    pub title: String,
    pub image_url: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

/// Input for updating a banner
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBannerInput {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}
