//! Moderator tools: browse every post, delete any post, ban or unban users.

use crate::config::FeedConfig;
use crate::db::{owner_repo, post_repo, user_repo};
use crate::error::{AppError, Result};
use crate::models::{OwnerKind, Page, PageRequest, Post};
use crate::services::identity::UserDirectory;
use crate::services::publications::PublicationService;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

/// Row counts shown on the moderation dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub users: i64,
    pub posts: i64,
    pub articles: i64,
    pub projects: i64,
    pub galleries: i64,
}

#[derive(Clone)]
pub struct ModerationService {
    pool: SqlitePool,
    users: Arc<dyn UserDirectory>,
    publications: PublicationService,
    limits: FeedConfig,
}

impl ModerationService {
    pub fn new(
        pool: SqlitePool,
        users: Arc<dyn UserDirectory>,
        publications: PublicationService,
        limits: FeedConfig,
    ) -> Self {
        Self {
            pool,
            users,
            publications,
            limits,
        }
    }

    /// Every post, drafts included, optionally filtered by title.
    pub async fn list_all_posts(
        &self,
        moderator: &str,
        query: Option<&str>,
        request: PageRequest,
    ) -> Result<Page<Post>> {
        self.users.require_moderator(moderator).await?;
        let window = request.window(self.limits.max_page_size)?;
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let mut conn = self.pool.acquire().await?;
        let items = post_repo::list_all(&mut conn, query, window).await?;
        Ok(Page::from_window(items, window))
    }

    /// Delete a post and its owner through the regular delete path.
    pub async fn delete_post(&self, moderator: &str, post_id: i64) -> Result<()> {
        self.users.require_moderator(moderator).await?;
        let post = {
            let mut conn = self.pool.acquire().await?;
            post_repo::find_by_id(&mut conn, post_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?
        };

        self.publications.delete_owner_unchecked(post.owner).await?;
        warn!(moderator, post_id, owner = %post.owner, author = %post.author, "Post removed by moderator");
        Ok(())
    }

    /// Ban (`active = false`) or unban a user. Moderators cannot change
    /// accounts at or above their own authority.
    pub async fn set_user_active(&self, moderator: &str, username: &str, active: bool) -> Result<()> {
        let actor = self.users.require_moderator(moderator).await?;
        let target = self
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user '{}'", username)))?;

        if target.username != actor.username && target.authority() >= actor.authority() {
            return Err(AppError::Forbidden(format!(
                "{} cannot change the status of {}",
                moderator, username
            )));
        }

        let mut conn = self.pool.acquire().await?;
        user_repo::set_active(&mut conn, username, active).await?;
        info!(moderator, username, active, "User status changed");
        Ok(())
    }

    pub async fn summary(&self, moderator: &str) -> Result<Summary> {
        self.users.require_moderator(moderator).await?;
        let mut conn = self.pool.acquire().await?;
        Ok(Summary {
            users: user_repo::count_users(&mut conn).await?,
            posts: post_repo::count_posts(&mut conn).await?,
            articles: owner_repo::count_owners(&mut conn, OwnerKind::Article).await?,
            projects: owner_repo::count_owners(&mut conn, OwnerKind::Project).await?,
            galleries: owner_repo::count_owners(&mut conn, OwnerKind::Gallery).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, SystemClock};
    use crate::db;
    use crate::models::{Authority, NewUser, OwnerInput};
    use crate::services::identity::UserRepository;
    use crate::services::notifications::NotificationDispatcher;

    struct Fixture {
        moderation: ModerationService,
        publications: PublicationService,
        users: UserRepository,
    }

    async fn fixture() -> Fixture {
        let pool = db::connect_in_memory().await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let users = UserRepository::new(pool.clone(), clock.clone());
        users
            .create_user(NewUser::new("alice", "alice@example.com"))
            .await
            .unwrap();
        users
            .create_user(NewUser::new("mod", "mod@example.com").with_authority(Authority::Moderator))
            .await
            .unwrap();
        users
            .create_user(NewUser::new("root", "root@example.com").with_authority(Authority::Admin))
            .await
            .unwrap();
        let directory: Arc<dyn UserDirectory> = Arc::new(users.clone());
        let publications = PublicationService::new(
            pool.clone(),
            clock,
            directory.clone(),
            NotificationDispatcher::disabled(),
            FeedConfig::default(),
        );
        Fixture {
            moderation: ModerationService::new(
                pool,
                directory,
                publications.clone(),
                FeedConfig::default(),
            ),
            publications,
            users,
        }
    }

    #[tokio::test]
    async fn regular_users_cannot_moderate() {
        let f = fixture().await;
        assert!(matches!(
            f.moderation
                .list_all_posts("alice", None, PageRequest::new(1, 12))
                .await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            f.moderation.summary("alice").await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn moderator_sees_drafts_and_deletes_posts() {
        let f = fixture().await;
        f.publications
            .create_owner("alice", OwnerInput::article("Draft", "body"), false)
            .await
            .unwrap();
        f.publications
            .create_owner("alice", OwnerInput::gallery("Spam gallery"), true)
            .await
            .unwrap();

        let all = f
            .moderation
            .list_all_posts("mod", None, PageRequest::new(1, 12))
            .await
            .unwrap();
        assert_eq!(all.items.len(), 2);

        let spam = f
            .moderation
            .list_all_posts("mod", Some("spam"), PageRequest::new(1, 12))
            .await
            .unwrap();
        assert_eq!(spam.items.len(), 1);

        f.moderation.delete_post("mod", spam.items[0].id).await.unwrap();
        let summary = f.moderation.summary("mod").await.unwrap();
        assert_eq!(summary.posts, 1);
        assert_eq!(summary.galleries, 0);
        assert_eq!(summary.articles, 1);
        assert_eq!(summary.users, 3);

        assert!(matches!(
            f.moderation.delete_post("mod", 9999).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn ban_and_unban() {
        let f = fixture().await;
        f.moderation.set_user_active("mod", "alice", false).await.unwrap();
        assert!(matches!(
            f.users.require_active("alice").await,
            Err(AppError::Unauthorized(_))
        ));

        f.moderation.set_user_active("mod", "alice", true).await.unwrap();
        assert!(f.users.require_active("alice").await.is_ok());

        assert!(matches!(
            f.moderation.set_user_active("mod", "root", false).await,
            Err(AppError::Forbidden(_))
        ));
        f.moderation.set_user_active("root", "mod", false).await.unwrap();
    }
}
