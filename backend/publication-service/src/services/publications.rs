//! Owner write paths: create, update, publish, delete, tags and gallery
//! images. Each path writes the owner and its index mirror in one
//! transaction; the notification is queued only after commit.

use crate::clock::Clock;
use crate::config::FeedConfig;
use crate::db::{self, owner_repo, tag_repo, vote_repo};
use crate::error::{AppError, Result};
use crate::metrics::index_sync::INDEX_SYNC_DURATION_SECONDS;
use crate::models::{Image, NewImage, OwnerHeader, OwnerInput, OwnerKind, OwnerRef, Post, Tag};
use crate::services::identity::UserDirectory;
use crate::services::index_sync::{self, OwnerEvent};
use crate::services::notifications::NotificationDispatcher;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use validator::Validate;

#[derive(Clone)]
pub struct PublicationService {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    users: Arc<dyn UserDirectory>,
    notifier: NotificationDispatcher,
    limits: FeedConfig,
}

impl PublicationService {
    pub fn new(
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
        users: Arc<dyn UserDirectory>,
        notifier: NotificationDispatcher,
        limits: FeedConfig,
    ) -> Self {
        Self {
            pool,
            clock,
            users,
            notifier,
            limits,
        }
    }

    /// Create an owner entity and its post index row.
    pub async fn create_owner(&self, author: &str, input: OwnerInput, published: bool) -> Result<OwnerRef> {
        input.check()?;
        self.users.require_active(author).await?;

        let timer = Instant::now();
        let now = self.clock.now();
        let mut tx = db::begin_write(&self.pool).await?;

        let id = owner_repo::insert_owner(&mut tx, author, &input, published, now).await?;
        let owner = OwnerRef::new(input.kind(), id);
        let post = index_sync::apply(&mut tx, OwnerEvent::Created, owner).await?;

        tx.commit().await?;
        observe("create", timer);

        info!(
            post_id = post.id,
            owner_type = %owner.kind,
            owner_id = owner.id,
            author,
            published,
            "Owner created"
        );

        if post.published {
            self.notifier.notify_new_post(&post);
        }

        Ok(owner)
    }

    /// Overwrite title and kind-specific fields. The publication flag is not
    /// touched; use [`publish`](Self::publish).
    pub async fn update_owner(&self, actor: &str, owner: OwnerRef, input: OwnerInput) -> Result<Post> {
        input.check()?;
        if input.kind() != owner.kind {
            return Err(AppError::Validation(format!(
                "{} fields supplied for {}",
                input.kind(),
                owner
            )));
        }
        self.users.require_active(actor).await?;

        let timer = Instant::now();
        let mut tx = db::begin_write(&self.pool).await?;
        let header = load_header(&mut tx, owner).await?;
        authorize(&header, actor, owner)?;

        owner_repo::update_owner(&mut tx, owner.id, &input, self.clock.now()).await?;
        let post = index_sync::apply(&mut tx, OwnerEvent::Saved, owner).await?;

        tx.commit().await?;
        observe("update", timer);

        info!(post_id = post.id, owner_type = %owner.kind, owner_id = owner.id, "Owner updated");
        Ok(post)
    }

    /// One-way Draft -> Published transition. Publishing an already published
    /// owner is a no-op and does not notify again.
    pub async fn publish(&self, actor: &str, owner: OwnerRef) -> Result<Post> {
        self.users.require_active(actor).await?;

        let mut tx = db::begin_write(&self.pool).await?;
        let header = load_header(&mut tx, owner).await?;
        authorize(&header, actor, owner)?;

        let transitioned = owner_repo::mark_published(&mut tx, owner, self.clock.now()).await?;
        let post = index_sync::apply(&mut tx, OwnerEvent::Saved, owner).await?;
        tx.commit().await?;

        if transitioned {
            info!(post_id = post.id, owner_type = %owner.kind, owner_id = owner.id, "Owner published");
            self.notifier.notify_new_post(&post);
        }

        Ok(post)
    }

    /// Delete an owner as its author.
    pub async fn delete_owner(&self, actor: &str, owner: OwnerRef) -> Result<()> {
        self.users.require_active(actor).await?;
        self.delete(owner, Some(actor)).await
    }

    /// Delete an owner on behalf of a moderator; authorization is the
    /// caller's job.
    pub(crate) async fn delete_owner_unchecked(&self, owner: OwnerRef) -> Result<()> {
        self.delete(owner, None).await
    }

    async fn delete(&self, owner: OwnerRef, actor: Option<&str>) -> Result<()> {
        let timer = Instant::now();
        let mut tx = db::begin_write(&self.pool).await?;

        let header = load_header(&mut tx, owner).await?;
        if let Some(actor) = actor {
            authorize(&header, actor, owner)?;
        }

        // index row and its associations go first, then the owner's own rows
        let post = index_sync::apply(&mut tx, OwnerEvent::Deleted, owner).await?;
        let votes = vote_repo::clear_votes(&mut tx, owner).await?;
        owner_repo::clear_tags(&mut tx, owner).await?;
        if owner.kind == OwnerKind::Gallery {
            owner_repo::clear_images(&mut tx, owner.id).await?;
        }
        if owner_repo::delete_owner(&mut tx, owner).await? == 0 {
            return Err(AppError::Inconsistency(format!("{} vanished during delete", owner)));
        }

        tx.commit().await?;
        observe("delete", timer);

        info!(
            post_id = post.id,
            owner_type = %owner.kind,
            owner_id = owner.id,
            votes_removed = votes,
            moderated = actor.is_none(),
            "Owner deleted"
        );
        Ok(())
    }

    /// Attach a tag (created on demand) to the owner and re-mirror the post's
    /// tag set.
    pub async fn add_tag(&self, actor: &str, owner: OwnerRef, name: &str) -> Result<Tag> {
        let name = normalize_tag_name(name)?;
        self.users.require_active(actor).await?;

        let mut tx = db::begin_write(&self.pool).await?;
        let header = load_header(&mut tx, owner).await?;
        authorize(&header, actor, owner)?;

        let tag = tag_repo::find_or_create(&mut tx, &name).await?;
        if owner_repo::attach_tag(&mut tx, owner, tag.id).await? {
            owner_repo::touch_owner(&mut tx, owner, self.clock.now()).await?;
            index_sync::apply(&mut tx, OwnerEvent::Saved, owner).await?;
        }
        tx.commit().await?;

        info!(owner_type = %owner.kind, owner_id = owner.id, tag = %tag.name, "Tag attached");
        Ok(tag)
    }

    pub async fn remove_tag(&self, actor: &str, owner: OwnerRef, name: &str) -> Result<()> {
        let name = normalize_tag_name(name)?;
        self.users.require_active(actor).await?;

        let mut tx = db::begin_write(&self.pool).await?;
        let header = load_header(&mut tx, owner).await?;
        authorize(&header, actor, owner)?;

        let tag = tag_repo::find_by_name(&mut tx, &name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("tag '{}'", name)))?;
        if !owner_repo::detach_tag(&mut tx, owner, tag.id).await? {
            return Err(AppError::NotFound(format!("tag '{}' on {}", name, owner)));
        }
        owner_repo::touch_owner(&mut tx, owner, self.clock.now()).await?;
        index_sync::apply(&mut tx, OwnerEvent::Saved, owner).await?;
        tx.commit().await?;

        info!(owner_type = %owner.kind, owner_id = owner.id, tag = %name, "Tag detached");
        Ok(())
    }

    pub async fn tags_of(&self, owner: OwnerRef) -> Result<Vec<Tag>> {
        let mut conn = self.pool.acquire().await?;
        load_header(&mut conn, owner).await?;
        Ok(tag_repo::tags_of_owner(&mut conn, owner).await?)
    }

    /// Append an image to a gallery.
    pub async fn add_image(&self, actor: &str, gallery_id: i64, image: NewImage) -> Result<Image> {
        image.validate()?;
        self.users.require_active(actor).await?;
        let owner = OwnerRef::gallery(gallery_id);

        let mut tx = db::begin_write(&self.pool).await?;
        let header = load_header(&mut tx, owner).await?;
        authorize(&header, actor, owner)?;

        let count = owner_repo::count_images(&mut tx, gallery_id).await?;
        if count >= i64::from(self.limits.gallery_max_images) {
            warn!(gallery_id, count, "Gallery image limit reached");
            return Err(AppError::Validation(format!(
                "a gallery holds at most {} images",
                self.limits.gallery_max_images
            )));
        }

        let created = owner_repo::insert_image(&mut tx, gallery_id, actor, &image).await?;
        owner_repo::touch_owner(&mut tx, owner, self.clock.now()).await?;
        index_sync::apply(&mut tx, OwnerEvent::Saved, owner).await?;
        tx.commit().await?;

        info!(gallery_id, image_id = created.id, position = created.position, "Image added");
        Ok(created)
    }

    pub async fn remove_image(&self, actor: &str, gallery_id: i64, image_id: i64) -> Result<()> {
        self.users.require_active(actor).await?;
        let owner = OwnerRef::gallery(gallery_id);

        let mut tx = db::begin_write(&self.pool).await?;
        let header = load_header(&mut tx, owner).await?;
        authorize(&header, actor, owner)?;

        if !owner_repo::delete_image(&mut tx, gallery_id, image_id).await? {
            return Err(AppError::NotFound(format!("image {} in {}", image_id, owner)));
        }
        owner_repo::touch_owner(&mut tx, owner, self.clock.now()).await?;
        index_sync::apply(&mut tx, OwnerEvent::Saved, owner).await?;
        tx.commit().await?;

        info!(gallery_id, image_id, "Image removed");
        Ok(())
    }
}

pub(crate) fn normalize_tag_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > 64 {
        return Err(AppError::Validation(
            "tag names must be between 1 and 64 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

pub(crate) async fn load_header(conn: &mut SqliteConnection, owner: OwnerRef) -> Result<OwnerHeader> {
    owner_repo::find_header(conn, owner)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} does not exist", owner)))
}

fn authorize(header: &OwnerHeader, actor: &str, owner: OwnerRef) -> Result<()> {
    if header.author != actor {
        warn!(owner = %owner, actor, author = %header.author, "Rejected write by non-author");
        return Err(AppError::Unauthorized(format!(
            "{} is not the author of {}",
            actor, owner
        )));
    }
    Ok(())
}

fn observe(operation: &str, started: Instant) {
    INDEX_SYNC_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::db::{self, post_repo};
    use crate::models::NewUser;
    use crate::services::identity::UserRepository;

    async fn service() -> (PublicationService, SqlitePool) {
        let pool = db::connect_in_memory().await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let users = UserRepository::new(pool.clone(), clock.clone());
        users
            .create_user(NewUser::new("alice", "alice@example.com"))
            .await
            .unwrap();
        users
            .create_user(NewUser::new("mallory", "mallory@example.com"))
            .await
            .unwrap();
        let service = PublicationService::new(
            pool.clone(),
            clock,
            Arc::new(users),
            NotificationDispatcher::disabled(),
            FeedConfig::default(),
        );
        (service, pool)
    }

    #[tokio::test]
    async fn non_author_cannot_update() {
        let (service, _pool) = service().await;
        let owner = service
            .create_owner("alice", OwnerInput::article("Hello", "body"), false)
            .await
            .unwrap();

        let err = service
            .update_owner("mallory", owner, OwnerInput::article("Pwned", "body"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn update_with_other_kind_is_rejected() {
        let (service, _pool) = service().await;
        let owner = service
            .create_owner("alice", OwnerInput::article("Hello", "body"), false)
            .await
            .unwrap();

        let err = service
            .update_owner("alice", owner, OwnerInput::gallery("Hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn publish_is_one_way_and_idempotent() {
        let (service, pool) = service().await;
        let owner = service
            .create_owner("alice", OwnerInput::project("Tool", "desc", None), false)
            .await
            .unwrap();

        let post = service.publish("alice", owner).await.unwrap();
        assert!(post.published);
        let again = service.publish("alice", owner).await.unwrap();
        assert!(again.published);

        // a later update keeps the owner published
        service
            .update_owner("alice", owner, OwnerInput::project("Tool v2", "desc", None))
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let post = post_repo::find_by_owner(&mut conn, owner).await.unwrap().unwrap();
        assert!(post.published);
        assert_eq!(post.title, "Tool v2");
    }

    #[tokio::test]
    async fn gallery_image_limit_is_enforced() {
        let (service, _pool) = service().await;
        let owner = service
            .create_owner("alice", OwnerInput::gallery("Shots"), true)
            .await
            .unwrap();

        for i in 0..10 {
            let image = NewImage {
                image_url: format!("https://img.example.com/{}.png", i),
                thumb_url: None,
                delete_url: None,
                footer: String::new(),
            };
            let created = service.add_image("alice", owner.id, image).await.unwrap();
            assert_eq!(created.position, i);
        }

        let extra = NewImage {
            image_url: "https://img.example.com/extra.png".to_string(),
            thumb_url: None,
            delete_url: None,
            footer: String::new(),
        };
        let err = service.add_image("alice", owner.id, extra).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn removing_an_image_keeps_positions_dense() {
        let (service, pool) = service().await;
        let owner = service
            .create_owner("alice", OwnerInput::gallery("Shots"), true)
            .await
            .unwrap();

        let mut ids = Vec::new();
        for i in 0..3 {
            let image = NewImage {
                image_url: format!("https://img.example.com/{}.png", i),
                thumb_url: None,
                delete_url: None,
                footer: format!("#{}", i),
            };
            ids.push(service.add_image("alice", owner.id, image).await.unwrap().id);
        }

        service.remove_image("alice", owner.id, ids[0]).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let images = owner_repo::list_images(&mut conn, owner.id).await.unwrap();
        let positions: Vec<i64> = images.iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 1]);
        assert_eq!(images[0].footer, "#1");
    }

    #[tokio::test]
    async fn tags_are_mirrored_into_the_index() {
        let (service, pool) = service().await;
        let owner = service
            .create_owner("alice", OwnerInput::article("Hello", "body"), true)
            .await
            .unwrap();

        service.add_tag("alice", owner, "rust").await.unwrap();
        service.add_tag("alice", owner, " sqlite ").await.unwrap();
        // attaching twice is a no-op
        service.add_tag("alice", owner, "rust").await.unwrap();

        let names: Vec<String> = service
            .tags_of(owner)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["rust".to_string(), "sqlite".to_string()]);

        service.remove_tag("alice", owner, "rust").await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let post = post_repo::find_by_owner(&mut conn, owner).await.unwrap().unwrap();
        assert_eq!(post_repo::tag_ids_of_post(&mut conn, post.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inactive_author_cannot_create() {
        let (service, pool) = service().await;
        let users = UserRepository::new(pool, Arc::new(SystemClock));
        users.set_active("alice", false).await.unwrap();

        let err = service
            .create_owner("alice", OwnerInput::article("Hello", "body"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
