//! User repository
//!
//! Database operations for user accounts.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::models::{User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// List users, newest first, optionally only one role
    async fn list(&self, offset: i64, limit: i64, role: Option<UserRole>) -> Result<Vec<User>>;

    /// Count users, optionally only one role
    async fn count(&self, role: Option<UserRole>) -> Result<i64>;

    /// Update profile fields and role
    async fn update(&self, user: &User) -> Result<User>;

    /// Delete a user; returns whether a row was removed
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Count all users
    async fn count_all(&self) -> Result<i64> {
        self.count(None).await
    }
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => create_user_mysql(pool, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_user_by_id_mysql(pool, id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_by_email_sqlite(pool, email).await,
            Backend::Mysql(pool) => get_user_by_email_mysql(pool, email).await,
        }
    }

    async fn list(&self, offset: i64, limit: i64, role: Option<UserRole>) -> Result<Vec<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_users_sqlite(pool, offset, limit, role).await,
            Backend::Mysql(pool) => list_users_mysql(pool, offset, limit, role).await,
        }
    }

    async fn count(&self, role: Option<UserRole>) -> Result<i64> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => count_users_sqlite(pool, role).await,
            Backend::Mysql(pool) => count_users_mysql(pool, role).await,
        }
    }

    async fn update(&self, user: &User) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => update_user_mysql(pool, user).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => delete_user_sqlite(pool, id).await,
            Backend::Mysql(pool) => delete_user_mysql(pool, id).await,
        }
    }
}

const USER_COLUMNS: &str =
    "id, email, username, display_name, avatar_url, role, created_at, updated_at";

const INSERT_USER: &str = r#"
    INSERT INTO users (email, username, display_name, avatar_url, role, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_USER: &str = r#"
    UPDATE users
    SET email = ?, username = ?, display_name = ?, avatar_url = ?, role = ?, updated_at = ?
    WHERE id = ?
"#;

fn select_users(filter: &str) -> String {
    format!("SELECT {} FROM users {}", USER_COLUMNS, filter)
}

fn role_param(role: Option<UserRole>) -> Option<&'static str> {
    role.map(|r| r.as_str())
}

fn parse_role(role_str: &str) -> Result<UserRole> {
    UserRole::from_str(role_str).with_context(|| format!("Invalid role in database: {}", role_str))
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(INSERT_USER)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .bind(user.role.as_str())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&select_users("WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&select_users("WHERE email = ?"))
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn list_users_sqlite(
    pool: &SqlitePool,
    offset: i64,
    limit: i64,
    role: Option<UserRole>,
) -> Result<Vec<User>> {
    let rows = sqlx::query(&select_users(
        "WHERE (? IS NULL OR role = ?) ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
    ))
    .bind(role_param(role))
    .bind(role_param(role))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("Failed to list users")?;

    rows.iter().map(row_to_user_sqlite).collect()
}

async fn count_users_sqlite(pool: &SqlitePool, role: Option<UserRole>) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users WHERE (? IS NULL OR role = ?)")
        .bind(role_param(role))
        .bind(role_param(role))
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn update_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    sqlx::query(UPDATE_USER)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .bind(user.role.as_str())
        .bind(Utc::now())
        .bind(user.id)
        .execute(pool)
        .await
        .context("Failed to update user")?;

    get_user_by_id_sqlite(pool, user.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

async fn delete_user_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete user")?;

    Ok(result.rows_affected() > 0)
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");

    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        avatar_url: row.get("avatar_url"),
        role: parse_role(&role_str)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(INSERT_USER)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .bind(user.role.as_str())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&select_users("WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&select_users("WHERE email = ?"))
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn list_users_mysql(
    pool: &MySqlPool,
    offset: i64,
    limit: i64,
    role: Option<UserRole>,
) -> Result<Vec<User>> {
    let rows = sqlx::query(&select_users(
        "WHERE (? IS NULL OR role = ?) ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
    ))
    .bind(role_param(role))
    .bind(role_param(role))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("Failed to list users")?;

    rows.iter().map(row_to_user_mysql).collect()
}

async fn count_users_mysql(pool: &MySqlPool, role: Option<UserRole>) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users WHERE (? IS NULL OR role = ?)")
        .bind(role_param(role))
        .bind(role_param(role))
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn update_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    sqlx::query(UPDATE_USER)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .bind(user.role.as_str())
        .bind(Utc::now())
        .bind(user.id)
        .execute(pool)
        .await
        .context("Failed to update user")?;

    get_user_by_id_mysql(pool, user.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

async fn delete_user_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete user")?;

    Ok(result.rows_affected() > 0)
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role_str: String = row.get("role");

    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        avatar_url: row.get("avatar_url"),
        role: parse_role(&role_str)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
