//! Services layer - Business logic
//!
//! Services validate input, run the permission predicates, coordinate
//! repositories with the cache and object storage, and report failures
//! through one error enum each.

pub mod banner;
pub mod gallery;
pub mod post;
pub mod reference;
pub mod user;

pub use banner::{BannerService, BannerServiceError};
pub use gallery::{GalleryService, GalleryServiceError};
pub use post::{generate_slug, PostService, PostServiceError};
pub use reference::{ReferenceService, ReferenceServiceError};
pub use user::{UserService, UserServiceError};
