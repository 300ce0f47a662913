//! User model
//!
//! Accounts are created by the fronting identity service; this side only
//! keeps the profile and the role that drives permissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique)
    pub email: String,
    /// Short handle shown in bylines
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Role deciding what the account may do
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, username: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            email,
            username,
            display_name: None,
            avatar_url: None,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Name to show publicly
    pub fn display(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

/// User role, ordered from least to most privileged.
///
/// - User: reader, may bookmark posts
/// - Editor: writes posts and gallery items
/// - SubAdmin: manages the site and accounts below them
/// - Admin: full access
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Editor,
    SubAdmin,
    Admin,
}

impl UserRole {
    /// Numeric privilege level; higher means more privileged
    pub fn rank(self) -> u8 {
        match self {
            UserRole::User => 0,
            UserRole::Editor => 1,
            UserRole::SubAdmin => 2,
            UserRole::Admin => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Editor => "editor",
            UserRole::SubAdmin => "sub_admin",
            UserRole::Admin => "admin",
        }
    }

    pub const ALL: [UserRole; 4] = [
        UserRole::User,
        UserRole::Editor,
        UserRole::SubAdmin,
        UserRole::Admin,
    ];
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "editor" => Ok(UserRole::Editor),
            "sub_admin" | "subadmin" | "sub-admin" => Ok(UserRole::SubAdmin),
            "admin" => Ok(UserRole::Admin),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Input for creating a user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUserInput {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Requested role; ignored for the very first account
    #[serde(default)]
    pub role: Option<UserRole>,
}

/// Profile fields a user may change
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserInput {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}
