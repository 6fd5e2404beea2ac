//! User-defined sections grouping a user's own posts.

use crate::config::FeedConfig;
use crate::db::{self, post_repo, section_repo};
use crate::error::{AppError, Result};
use crate::models::{NewSection, Page, PageRequest, Post, Section};
use crate::services::identity::UserDirectory;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

#[derive(Clone)]
pub struct SectionService {
    pool: SqlitePool,
    users: Arc<dyn UserDirectory>,
    limits: FeedConfig,
}

impl SectionService {
    pub fn new(pool: SqlitePool, users: Arc<dyn UserDirectory>, limits: FeedConfig) -> Self {
        Self {
            pool,
            users,
            limits,
        }
    }

    pub async fn create_section(&self, owner: &str, name: &str) -> Result<Section> {
        let input = NewSection {
            name: name.trim().to_string(),
        };
        input.validate()?;
        if input.name == owner {
            return Err(AppError::Validation(
                "section name cannot be the owner's username".to_string(),
            ));
        }
        self.users.require_active(owner).await?;

        let mut conn = self.pool.acquire().await?;
        if section_repo::find_section(&mut conn, owner, &input.name)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "section '{}' already exists",
                input.name
            )));
        }
        let section = section_repo::insert_section(&mut conn, owner, &input.name).await?;
        info!(section_id = section.id, owner, name = %section.name, "Section created");
        Ok(section)
    }

    pub async fn delete_section(&self, owner: &str, name: &str) -> Result<()> {
        self.users.require_active(owner).await?;
        let mut tx = db::begin_write(&self.pool).await?;
        let section = require_section(&mut tx, owner, name).await?;
        section_repo::delete_section(&mut tx, section.id).await?;
        tx.commit().await?;

        info!(section_id = section.id, owner, "Section deleted");
        Ok(())
    }

    pub async fn list_sections(&self, owner: &str) -> Result<Vec<Section>> {
        let mut conn = self.pool.acquire().await?;
        Ok(section_repo::list_sections(&mut conn, owner).await?)
    }

    /// Put one of the owner's own posts into the section.
    pub async fn add_post(&self, owner: &str, name: &str, post_id: i64) -> Result<()> {
        self.users.require_active(owner).await?;
        let mut tx = db::begin_write(&self.pool).await?;
        let section = require_section(&mut tx, owner, name).await?;
        let post = post_repo::find_by_id(&mut tx, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;
        if post.author != owner {
            return Err(AppError::Unauthorized(format!(
                "post {} does not belong to {}",
                post_id, owner
            )));
        }
        if section_repo::has_membership(&mut tx, section.id, post.id).await? {
            return Err(AppError::Conflict(format!(
                "post {} is already in section '{}'",
                post_id, section.name
            )));
        }
        section_repo::insert_membership(&mut tx, section.id, post.id).await?;
        tx.commit().await?;

        info!(section_id = section.id, post_id, "Post added to section");
        Ok(())
    }

    pub async fn remove_post(&self, owner: &str, name: &str, post_id: i64) -> Result<()> {
        self.users.require_active(owner).await?;
        let mut tx = db::begin_write(&self.pool).await?;
        let section = require_section(&mut tx, owner, name).await?;
        if section_repo::delete_membership(&mut tx, section.id, post_id).await? == 0 {
            return Err(AppError::NotFound(format!(
                "post {} is not in section '{}'",
                post_id, name
            )));
        }
        tx.commit().await?;

        info!(section_id = section.id, post_id, "Post removed from section");
        Ok(())
    }

    /// Posts in a section. The owner also sees their drafts.
    pub async fn section_feed(
        &self,
        owner: &str,
        name: &str,
        viewer: Option<&str>,
        request: PageRequest,
    ) -> Result<Page<Post>> {
        let window = request.window(self.limits.max_page_size)?;
        let mut conn = self.pool.acquire().await?;
        let section = require_section(&mut conn, owner, name).await?;
        let include_drafts = viewer == Some(owner);
        let items = section_repo::list_section_posts(&mut conn, section.id, include_drafts, window).await?;
        Ok(Page::from_window(items, window))
    }

    /// The owner's posts not yet in the section, drafts included, for
    /// picking new members. Only the owner may list them.
    pub async fn posts_not_in_section(
        &self,
        actor: &str,
        owner: &str,
        name: &str,
        request: PageRequest,
    ) -> Result<Page<Post>> {
        if actor != owner {
            warn!(actor = %actor, owner = %owner, "Section candidates requested by non-owner");
            return Err(AppError::Unauthorized(format!(
                "{} cannot browse the posts of {}",
                actor, owner
            )));
        }
        self.users.require_active(actor).await?;
        let window = request.window(self.limits.max_page_size)?;
        let mut conn = self.pool.acquire().await?;
        let section = require_section(&mut conn, owner, name).await?;
        let items = section_repo::list_posts_not_in_section(&mut conn, &section, window).await?;
        Ok(Page::from_window(items, window))
    }
}

async fn require_section(conn: &mut SqliteConnection, owner: &str, name: &str) -> Result<Section> {
    section_repo::find_section(conn, owner, name.trim())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("section '{}' of {}", name, owner)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, SystemClock};
    use crate::db;
    use crate::models::{NewUser, OwnerInput};
    use crate::services::identity::UserRepository;
    use crate::services::notifications::NotificationDispatcher;
    use crate::services::publications::PublicationService;

    struct Fixture {
        sections: SectionService,
        publications: PublicationService,
        pool: SqlitePool,
    }

    async fn fixture() -> Fixture {
        let pool = db::connect_in_memory().await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let users = UserRepository::new(pool.clone(), clock.clone());
        for name in ["alice", "bob"] {
            users
                .create_user(NewUser::new(name, format!("{}@example.com", name)))
                .await
                .unwrap();
        }
        let directory: Arc<dyn UserDirectory> = Arc::new(users);
        Fixture {
            sections: SectionService::new(pool.clone(), directory.clone(), FeedConfig::default()),
            publications: PublicationService::new(
                pool.clone(),
                clock,
                directory,
                NotificationDispatcher::disabled(),
                FeedConfig::default(),
            ),
            pool,
        }
    }

    async fn post_id(f: &Fixture, author: &str, title: &str, published: bool) -> i64 {
        let owner = f
            .publications
            .create_owner(author, OwnerInput::article(title, "body"), published)
            .await
            .unwrap();
        let mut conn = f.pool.acquire().await.unwrap();
        post_repo::find_by_owner(&mut conn, owner).await.unwrap().unwrap().id
    }

    #[tokio::test]
    async fn section_names_are_validated() {
        let f = fixture().await;
        assert!(matches!(
            f.sections.create_section("alice", "abc").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            f.sections.create_section("alice", "alice").await,
            Err(AppError::Validation(_))
        ));

        f.sections.create_section("alice", "Writing").await.unwrap();
        assert!(matches!(
            f.sections.create_section("alice", "Writing").await,
            Err(AppError::Conflict(_))
        ));
        // same name for another owner is fine
        f.sections.create_section("bob", "Writing").await.unwrap();
    }

    #[tokio::test]
    async fn only_own_posts_can_be_added() {
        let f = fixture().await;
        f.sections.create_section("alice", "Writing").await.unwrap();
        let theirs = post_id(&f, "bob", "Bob's", true).await;
        let mine = post_id(&f, "alice", "Mine", true).await;

        assert!(matches!(
            f.sections.add_post("alice", "Writing", theirs).await,
            Err(AppError::Unauthorized(_))
        ));

        f.sections.add_post("alice", "Writing", mine).await.unwrap();
        assert!(matches!(
            f.sections.add_post("alice", "Writing", mine).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn section_feed_and_complement() {
        let f = fixture().await;
        f.sections.create_section("alice", "Writing").await.unwrap();
        let published = post_id(&f, "alice", "Published", true).await;
        let draft = post_id(&f, "alice", "Draft", false).await;
        let loose = post_id(&f, "alice", "Loose", true).await;

        f.sections.add_post("alice", "Writing", published).await.unwrap();
        f.sections.add_post("alice", "Writing", draft).await.unwrap();

        let public = f
            .sections
            .section_feed("alice", "Writing", None, PageRequest::new(1, 12))
            .await
            .unwrap();
        assert_eq!(public.items.len(), 1);

        let own = f
            .sections
            .section_feed("alice", "Writing", Some("alice"), PageRequest::new(1, 12))
            .await
            .unwrap();
        assert_eq!(own.items.len(), 2);

        let rest = f
            .sections
            .posts_not_in_section("alice", "alice", "Writing", PageRequest::new(1, 12))
            .await
            .unwrap();
        let ids: Vec<i64> = rest.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![loose]);

        let loose_draft = post_id(&f, "alice", "Unfinished", false).await;
        let rest = f
            .sections
            .posts_not_in_section("alice", "alice", "Writing", PageRequest::new(1, 12))
            .await
            .unwrap();
        assert!(rest.items.iter().any(|p| p.id == loose_draft));

        f.sections.remove_post("alice", "Writing", draft).await.unwrap();
        assert!(matches!(
            f.sections.remove_post("alice", "Writing", draft).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn only_the_owner_sees_section_candidates() {
        let f = fixture().await;
        f.sections.create_section("alice", "Writing").await.unwrap();
        post_id(&f, "alice", "Secret draft", false).await;

        assert!(matches!(
            f.sections
                .posts_not_in_section("bob", "alice", "Writing", PageRequest::new(1, 12))
                .await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            f.sections
                .posts_not_in_section("nobody", "alice", "Writing", PageRequest::new(1, 12))
                .await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn deleting_a_section_drops_memberships() {
        let f = fixture().await;
        f.sections.create_section("alice", "Writing").await.unwrap();
        let id = post_id(&f, "alice", "Mine", true).await;
        f.sections.add_post("alice", "Writing", id).await.unwrap();

        f.sections.delete_section("alice", "Writing").await.unwrap();
        assert!(f.sections.list_sections("alice").await.unwrap().is_empty());

        let mut conn = f.pool.acquire().await.unwrap();
        assert_eq!(
            section_repo::count_memberships_of_post(&mut conn, id).await.unwrap(),
            0
        );
    }
}
