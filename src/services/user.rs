//! User service
//!
//! Account management on top of the identities asserted by the fronting
//! auth service:
//! - The very first account becomes the admin
//! - Role changes go through the permission predicates
//! - The last admin can never be demoted

use crate::db::repositories::UserRepository;
use crate::models::{CreateUserInput, ListParams, PagedResult, UpdateUserInput, User, UserRole};
use crate::permissions::{self, Principal};
use anyhow::Context;
use std::sync::Arc;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// User service
pub struct UserService {
    repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    /// Whether no account exists yet
    pub async fn is_empty(&self) -> Result<bool, UserServiceError> {
        let count = self.repo.count_all().await.context("Failed to count users")?;
        Ok(count == 0)
    }

    /// Create an account.
    ///
    /// The first account is always an admin and needs no actor. Afterwards
    /// the actor must manage users and be allowed to hand out the role.
    pub async fn create(
        &self,
        actor: Option<&User>,
        input: CreateUserInput,
    ) -> Result<User, UserServiceError> {
        let email = input.email.trim().to_lowercase();
        let username = input.username.trim().to_string();
        if !is_valid_email(&email) {
            return Err(UserServiceError::ValidationError(
                "A valid email is required".into(),
            ));
        }
        if username.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Username cannot be empty".into(),
            ));
        }

        let role = if self.is_empty().await? {
            UserRole::Admin
        } else {
            let actor = actor.ok_or_else(|| {
                UserServiceError::Forbidden("Only administrators can create accounts".into())
            })?;
            let role = input.role.unwrap_or_default();
            if !permissions::can_manage_users(actor.role)
                || !permissions::can_assign_role(actor.role, role)
            {
                return Err(UserServiceError::Forbidden(format!(
                    "Cannot create an account with role {}",
                    role
                )));
            }
            role
        };

        if self
            .repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::DuplicateEmail(email));
        }

        let mut user = User::new(email, username, role);
        user.display_name = non_blank(input.display_name);
        user.avatar_url = non_blank(input.avatar_url);

        let user = self.repo.create(&user).await.context("Failed to create user")?;
        tracing::info!(user_id = user.id, role = %user.role, "Created user");
        Ok(user)
    }

    pub async fn get(&self, id: i64) -> Result<User, UserServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| UserServiceError::NotFound(id.to_string()))
    }

    /// Resolve an asserted identity; unknown ids yield `None`
    pub async fn find(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.repo.get_by_id(id).await.context("Failed to get user")?)
    }

    pub async fn list(
        &self,
        actor: &User,
        params: &ListParams,
        role: Option<UserRole>,
    ) -> Result<PagedResult<User>, UserServiceError> {
        if !permissions::can_manage_users(actor.role) {
            return Err(UserServiceError::Forbidden("Cannot list accounts".into()));
        }
        let users = self
            .repo
            .list(params.offset(), params.limit(), role)
            .await
            .context("Failed to list users")?;
        let total = self.repo.count(role).await.context("Failed to count users")?;
        Ok(PagedResult::new(users, total, params))
    }

    /// Change profile fields; the role is never touched here
    pub async fn update_profile(
        &self,
        actor: &User,
        id: i64,
        input: UpdateUserInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self.get(id).await?;
        if !permissions::can_modify_user(actor.into(), (&user).into()) {
            return Err(UserServiceError::Forbidden(
                "Cannot modify this account".into(),
            ));
        }

        if let Some(username) = input.username {
            let username = username.trim().to_string();
            if username.is_empty() {
                return Err(UserServiceError::ValidationError(
                    "Username cannot be empty".into(),
                ));
            }
            user.username = username;
        }
        if input.display_name.is_some() {
            user.display_name = non_blank(input.display_name);
        }
        if input.avatar_url.is_some() {
            user.avatar_url = non_blank(input.avatar_url);
        }

        Ok(self.repo.update(&user).await.context("Failed to update user")?)
    }

    pub async fn change_role(
        &self,
        actor: &User,
        id: i64,
        new_role: UserRole,
    ) -> Result<User, UserServiceError> {
        let mut user = self.get(id).await?;
        if !permissions::can_change_role(actor.into(), Principal::from(&user), new_role) {
            return Err(UserServiceError::Forbidden(format!(
                "Cannot change this account to {}",
                new_role
            )));
        }
        if user.role == new_role {
            return Ok(user);
        }

        if user.role == UserRole::Admin {
            let admins = self
                .repo
                .count(Some(UserRole::Admin))
                .await
                .context("Failed to count admins")?;
            if admins <= 1 {
                return Err(UserServiceError::ValidationError(
                    "The last admin cannot be demoted".into(),
                ));
            }
        }

        let old_role = user.role;
        user.role = new_role;
        let user = self.repo.update(&user).await.context("Failed to update role")?;
        tracing::info!(
            actor_id = actor.id,
            user_id = user.id,
            from = %old_role,
            to = %new_role,
            "Changed user role"
        );
        Ok(user)
    }

    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), UserServiceError> {
        if actor.id == id {
            return Err(UserServiceError::ValidationError(
                "You cannot delete your own account".into(),
            ));
        }
        let user = self.get(id).await?;
        if !permissions::can_manage_user(actor.into(), (&user).into()) {
            return Err(UserServiceError::Forbidden(
                "Cannot delete this account".into(),
            ));
        }

        self.repo.delete(id).await.context("Failed to delete user")?;
        tracing::info!(actor_id = actor.id, user_id = id, "Deleted user");
        Ok(())
    }
}

/// `local@domain.tld` with no whitespace
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
