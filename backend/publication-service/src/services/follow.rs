//! Follow Graph: one adjacency list per user, created the first time it is
//! needed.

use crate::clock::Clock;
use crate::config::FeedConfig;
use crate::db::{self, follow_repo, post_repo, user_repo};
use crate::error::{AppError, Result};
use crate::models::{FollowEntry, Follower, Page, PageRequest, Post};
use crate::services::identity::UserDirectory;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct FollowService {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    users: Arc<dyn UserDirectory>,
    limits: FeedConfig,
}

impl FollowService {
    pub fn new(
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
        users: Arc<dyn UserDirectory>,
        limits: FeedConfig,
    ) -> Self {
        Self {
            pool,
            clock,
            users,
            limits,
        }
    }

    /// Add `followed` to `follower`'s list.
    pub async fn follow(&self, follower: &str, followed: &str) -> Result<()> {
        if follower == followed {
            return Err(AppError::Validation("users cannot follow themselves".to_string()));
        }
        self.users.require_active(follower).await?;
        self.require_exists(followed).await?;

        let mut tx = db::begin_write(&self.pool).await?;
        let list = follow_repo::find_or_create_list(&mut tx, follower).await?;
        if follow_repo::is_following(&mut tx, list.id, followed).await? {
            return Err(AppError::Conflict(format!(
                "{} already follows {}",
                follower, followed
            )));
        }
        follow_repo::insert_follow(&mut tx, &list, followed, self.clock.now()).await?;
        tx.commit().await?;

        info!(follower, followed, "Follow created");
        Ok(())
    }

    pub async fn unfollow(&self, follower: &str, followed: &str) -> Result<()> {
        let mut tx = db::begin_write(&self.pool).await?;
        let list = follow_repo::find_list(&mut tx, follower)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} follows nobody", follower)))?;
        if follow_repo::delete_follow(&mut tx, list.id, followed).await? == 0 {
            return Err(AppError::NotFound(format!(
                "{} does not follow {}",
                follower, followed
            )));
        }
        tx.commit().await?;

        info!(follower, followed, "Follow removed");
        Ok(())
    }

    pub async fn is_following(&self, follower: &str, followed: &str) -> Result<bool> {
        self.require_exists(follower).await?;
        let mut conn = self.pool.acquire().await?;
        let list = follow_repo::find_or_create_list(&mut conn, follower).await?;
        Ok(follow_repo::is_following(&mut conn, list.id, followed).await?)
    }

    pub async fn list_following(&self, user: &str) -> Result<Vec<FollowEntry>> {
        self.require_exists(user).await?;
        let mut conn = self.pool.acquire().await?;
        let list = follow_repo::find_or_create_list(&mut conn, user).await?;
        Ok(follow_repo::list_following(&mut conn, list.id).await?)
    }

    /// Active users following `author`.
    pub async fn followers_of(&self, author: &str) -> Result<Vec<Follower>> {
        let mut conn = self.pool.acquire().await?;
        Ok(follow_repo::followers_of(&mut conn, author).await?)
    }

    /// Published posts of followed authors, newest first.
    pub async fn following_feed(&self, user: &str, request: PageRequest) -> Result<Page<Post>> {
        let window = request.window(self.limits.max_page_size)?;
        let mut conn = self.pool.acquire().await?;
        if follow_repo::find_list(&mut conn, user).await?.is_none() {
            return Ok(Page::empty(window));
        }
        let items = post_repo::list_following(&mut conn, user, window).await?;
        Ok(Page::from_window(items, window))
    }

    async fn require_exists(&self, username: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        match user_repo::find_by_username(&mut conn, username).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("user '{}'", username))),
        }
    }
}
