//! Cache layer
//!
//! Caches published post lookups, post listings and the active banners.
//! The driver is picked from configuration:
//! - `memory`: in-process moka cache (default)
//! - `none`: every lookup misses, writes are dropped
//!
//! # Usage
//!
//! ```rust,ignore
//! use atelier::cache::{create_cache, CacheLayer};
//! use atelier::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default());
//! cache.set("key", &"value", Duration::from_secs(60)).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheConfig, CacheDriver};

pub use memory::MemoryCache;

/// Cache layer trait
///
/// The generic methods make this trait not object safe; use the `Cache`
/// enum for runtime polymorphism.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values whose key matches a glob pattern
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Configured cache backend
#[derive(Debug)]
pub enum Cache {
    Memory(MemoryCache),
    Disabled,
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self {
            Cache::Memory(cache) => cache.get(key).await,
            Cache::Disabled => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.set(key, value, ttl).await,
            Cache::Disabled => Ok(()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete(key).await,
            Cache::Disabled => Ok(()),
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete_pattern(pattern).await,
            Cache::Disabled => Ok(()),
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.clear().await,
            Cache::Disabled => Ok(()),
        }
    }
}

/// Create the cache selected by `config`
pub fn create_cache(config: &CacheConfig) -> Arc<Cache> {
    match config.driver {
        CacheDriver::Memory => {
            let ttl = Duration::from_secs(config.ttl_seconds);
            let cache = MemoryCache::with_capacity_and_ttl(config.max_capacity, ttl);
            Arc::new(Cache::Memory(cache))
        }
        CacheDriver::None => {
            tracing::info!("Cache disabled by configuration");
            Arc::new(Cache::Disabled)
        }
    }
}
