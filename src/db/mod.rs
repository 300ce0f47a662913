//! Database layer
//!
//! SQLite is the default (single file or in-memory); MySQL is available for
//! larger deployments. The driver is selected from configuration and hidden
//! behind the `DatabasePool` trait.
//!
//! ```ignore
//! let pool = atelier::db::create_pool(&config.database).await?;
//! atelier::db::migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
