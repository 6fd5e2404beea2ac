//! User lookup collaborator.
//!
//! Write paths only need to know whether an account exists, is active and
//! what authority it holds.

use crate::clock::Clock;
use crate::db::user_repo;
use crate::error::{AppError, Result};
use crate::models::{NewUser, User};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Resolve an actor that must exist and be active.
    async fn require_active(&self, username: &str) -> Result<User> {
        match self.find_by_username(username).await? {
            Some(user) if user.active => Ok(user),
            Some(_) => Err(AppError::Unauthorized(format!(
                "account '{}' is inactive",
                username
            ))),
            None => Err(AppError::Unauthorized(format!(
                "unknown account '{}'",
                username
            ))),
        }
    }

    /// Resolve an active moderator (or admin).
    async fn require_moderator(&self, username: &str) -> Result<User> {
        let user = self.require_active(username).await?;
        if !user.is_moderator() {
            return Err(AppError::Unauthorized(format!(
                "'{}' is not a moderator",
                username
            )));
        }
        Ok(user)
    }
}

/// SQLite-backed user directory.
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl UserRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub async fn create_user(&self, user: NewUser) -> Result<User> {
        user.validate()?;
        let mut conn = self.pool.acquire().await?;
        let created = user_repo::insert_user(&mut conn, &user, self.clock.now()).await?;
        info!(username = %created.username, authority = created.authority_level, "User created");
        Ok(created)
    }

    /// Ban (`false`) or unban (`true`) an account.
    pub async fn set_active(&self, username: &str, active: bool) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        let updated = user_repo::set_active(&mut conn, username, active).await?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("user '{}'", username)));
        }
        info!(username, active, "User active flag changed");
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        Ok(user_repo::find_by_username(&mut conn, username).await?)
    }
}
