//! Atelier - publishing backend
//!
//! This library provides the core of the Atelier service: an image gallery
//! enriched by a generative AI model, a blog whose posts are rich-text
//! documents, a curated link directory and homepage banners.

pub mod analysis;
pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod document;
pub mod models;
pub mod permissions;
pub mod services;
pub mod storage;
pub mod web;
