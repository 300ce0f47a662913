//! Data models
//!
//! This module contains the data structures shared by the repositories,
//! services and API handlers:
//! - Database entities (User, Post, GalleryItem, Reference, Banner)
//! - API request inputs and list filters
//! - Pagination containers

mod banner;
mod gallery;
mod pagination;
mod post;
mod reference;
mod user;

pub use banner::{Banner, CreateBannerInput, UpdateBannerInput};
pub use gallery::{
    CreateGalleryItemInput, GalleryFilter, GalleryItem, MigrationReport, SimilarItem,
    UpdateGalleryItemInput,
};
pub use pagination::{ListParams, PagedResult};
pub use post::{CreatePostInput, Post, PostFilter, PostStatus, ScrapToggle, UpdatePostInput};
pub use reference::{CreateReferenceInput, Reference, UpdateReferenceInput};
pub use user::{CreateUserInput, UpdateUserInput, User, UserRole};
