//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles CRUD operations for a specific entity.
//! List-valued columns are stored as JSON text.

pub mod banner;
pub mod gallery;
pub mod post;
pub mod reference;
pub mod user;

pub use banner::{BannerRepository, SqlxBannerRepository};
pub use gallery::{GalleryRepository, SqlxGalleryRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use reference::{ReferenceRepository, SqlxReferenceRepository};
pub use user::{SqlxUserRepository, UserRepository};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Serialize a list column
pub(crate) fn to_json_text<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to serialize JSON column")
}

/// Deserialize a list column; NULL or empty text yields the default
pub(crate) fn from_json_text<T: DeserializeOwned + Default>(text: Option<String>) -> Result<T> {
    match text {
        Some(s) if !s.trim().is_empty() => {
            serde_json::from_str(&s).context("Failed to parse JSON column")
        }
        _ => Ok(T::default()),
    }
}

/// `LIKE ... ESCAPE '!'` pattern matching one string element of a JSON
/// array column
pub(crate) fn json_element_pattern(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    let escaped = quoted.replace('!', "!!").replace('%', "!%").replace('_', "!_");
    format!("%{}%", escaped)
}
