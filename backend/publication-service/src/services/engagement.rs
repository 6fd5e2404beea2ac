//! Engagement Aggregator and tag catalogue.
//!
//! Owns the `votes` table. A vote is unique per (tag, voter, owner): an
//! explicit existence check gives the usual Conflict, and the schema's unique
//! constraint turns a racing duplicate insert into the same Conflict.

use crate::clock::Clock;
use crate::config::FeedConfig;
use crate::db::{self, owner_repo, post_repo, tag_repo, vote_repo};
use crate::error::{AppError, Result};
use crate::metrics::engagement::TAG_VOTES_TOTAL;
use crate::models::{OwnerRef, Page, PageRequest, RankedPost, Tag, TagVotes, Vote};
use crate::services::identity::UserDirectory;
use crate::services::index_sync;
use crate::services::publications::normalize_tag_name;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct EngagementService {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    users: Arc<dyn UserDirectory>,
    limits: FeedConfig,
}

impl EngagementService {
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

    /// Register one vote of `voter` for `tag_id` on `owner`.
    pub async fn vote(&self, owner: OwnerRef, tag_id: i64, voter: &str) -> Result<Vote> {
        let result = self.try_vote(owner, tag_id, voter).await;
        let outcome = match &result {
            Ok(_) => "accepted",
            Err(AppError::Conflict(_)) => "duplicate",
            Err(AppError::NotFound(_)) | Err(AppError::Unauthorized(_)) => "rejected",
            Err(_) => "error",
        };
        TAG_VOTES_TOTAL.with_label_values(&[outcome]).inc();
        result
    }

    async fn try_vote(&self, owner: OwnerRef, tag_id: i64, voter: &str) -> Result<Vote> {
        self.users.require_active(voter).await?;

        let mut tx = db::begin_write(&self.pool).await?;
        let tag = tag_repo::find_by_id(&mut tx, tag_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("tag {}", tag_id)))?;
        // a draft is invisible to everyone but its author
        match owner_repo::find_header(&mut tx, owner).await? {
            Some(header) if header.published || header.author == voter => {}
            _ => return Err(AppError::NotFound(format!("{} does not exist", owner))),
        }

        if vote_repo::vote_exists(&mut tx, tag.id, voter, owner).await? {
            debug!(owner = %owner, tag = %tag.name, voter, "Duplicate vote");
            return Err(AppError::Conflict(format!(
                "{} already voted '{}' on {}",
                voter, tag.name, owner
            )));
        }

        let vote = vote_repo::insert_vote(&mut tx, tag.id, voter, owner, self.clock.now()).await?;
        index_sync::link_vote(&mut tx, owner, vote.id).await?;
        tx.commit().await?;

        info!(
            vote_id = vote.id,
            owner_type = %owner.kind,
            owner_id = owner.id,
            tag = %tag.name,
            voter,
            "Vote registered"
        );
        Ok(vote)
    }

    /// Register a vote by tag name. The tag must already exist.
    pub async fn vote_by_name(&self, owner: OwnerRef, tag_name: &str, voter: &str) -> Result<Vote> {
        let tag = self.find_tag(tag_name).await?;
        self.vote(owner, tag.id, voter).await
    }

    /// Withdraw one vote.
    pub async fn unvote(&self, owner: OwnerRef, tag_id: i64, voter: &str) -> Result<()> {
        let mut tx = db::begin_write(&self.pool).await?;
        let vote_id = vote_repo::find_vote_id(&mut tx, tag_id, voter, owner)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("no vote by {} for tag {} on {}", voter, tag_id, owner))
            })?;
        vote_repo::delete_vote(&mut tx, vote_id).await?;
        tx.commit().await?;

        info!(vote_id, owner_type = %owner.kind, owner_id = owner.id, voter, "Vote withdrawn");
        Ok(())
    }

    /// Remove every vote on `owner`. Returns the number removed.
    pub async fn clear_all_votes(&self, owner: OwnerRef) -> Result<u64> {
        let mut tx = db::begin_write(&self.pool).await?;
        let removed = vote_repo::clear_votes(&mut tx, owner).await?;
        tx.commit().await?;

        if removed > 0 {
            info!(owner_type = %owner.kind, owner_id = owner.id, removed, "Votes cleared");
        }
        Ok(removed)
    }

    /// Tags on `owner` ordered by vote count (descending, ties by tag id).
    pub async fn top_tags(&self, owner: OwnerRef, limit: u32) -> Result<Vec<TagVotes>> {
        let limit = limit.min(self.limits.top_tags_limit);
        let mut conn = self.pool.acquire().await?;
        Ok(vote_repo::top_tags(&mut conn, owner, i64::from(limit)).await?)
    }

    /// Published posts carrying or voted with `tag_name`, most-voted first.
    pub async fn rank_posts_by_tag_votes(
        &self,
        tag_name: &str,
        request: PageRequest,
    ) -> Result<Page<RankedPost>> {
        let window = request.window(self.limits.max_page_size)?;
        let mut conn = self.pool.acquire().await?;
        if tag_repo::find_by_name(&mut conn, tag_name).await?.is_none() {
            return Err(AppError::NotFound(format!("tag '{}'", tag_name)));
        }
        let items = post_repo::rank_by_tag_votes(&mut conn, tag_name, window).await?;
        Ok(Page::from_window(items, window))
    }

    /// Create a tag; an existing name is a Conflict.
    pub async fn create_tag(&self, name: &str) -> Result<Tag> {
        let name = normalize_tag_name(name)?;
        let mut conn = self.pool.acquire().await?;
        if tag_repo::find_by_name(&mut conn, &name).await?.is_some() {
            warn!(tag = %name, "Tag already exists");
            return Err(AppError::Conflict(format!("tag '{}' already exists", name)));
        }
        let tag = tag_repo::insert_tag(&mut conn, &name).await?;
        info!(tag_id = tag.id, tag = %tag.name, "Tag created");
        Ok(tag)
    }

    pub async fn find_or_create_tag(&self, name: &str) -> Result<Tag> {
        let name = normalize_tag_name(name)?;
        let mut conn = self.pool.acquire().await?;
        Ok(tag_repo::find_or_create(&mut conn, &name).await?)
    }

    pub async fn find_tag(&self, name: &str) -> Result<Tag> {
        let mut conn = self.pool.acquire().await?;
        tag_repo::find_by_name(&mut conn, name.trim())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("tag '{}'", name)))
    }

    /// Substring search over tag names, capped at the configured limit.
    pub async fn search_tags(&self, fragment: &str) -> Result<Vec<Tag>> {
        let mut conn = self.pool.acquire().await?;
        Ok(tag_repo::search(&mut conn, fragment.trim(), i64::from(self.limits.tag_search_limit)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::db;
    use crate::models::{NewUser, OwnerInput};
    use crate::services::identity::UserRepository;
    use crate::services::notifications::NotificationDispatcher;
    use crate::services::publications::PublicationService;

    struct Fixture {
        engagement: EngagementService,
        publications: PublicationService,
        users: UserRepository,
    }

    async fn fixture() -> Fixture {
        let pool = db::connect_in_memory().await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let users = UserRepository::new(pool.clone(), clock.clone());
        for name in ["alice", "bob", "carol"] {
            users
                .create_user(NewUser::new(name, format!("{}@example.com", name)))
                .await
                .unwrap();
        }
        let directory: Arc<dyn UserDirectory> = Arc::new(users.clone());
        Fixture {
            engagement: EngagementService::new(
                pool.clone(),
                clock.clone(),
                directory.clone(),
                FeedConfig::default(),
            ),
            publications: PublicationService::new(
                pool,
                clock,
                directory,
                NotificationDispatcher::disabled(),
                FeedConfig::default(),
            ),
            users,
        }
    }

    #[tokio::test]
    async fn vote_on_unknown_tag_is_not_found() {
        let f = fixture().await;
        let owner = f
            .publications
            .create_owner("alice", OwnerInput::article("Hello", "body"), true)
            .await
            .unwrap();

        let err = f.engagement.vote(owner, 999, "bob").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn vote_on_missing_owner_is_not_found() {
        let f = fixture().await;
        let tag = f.engagement.create_tag("rust").await.unwrap();
        let err = f
            .engagement
            .vote(OwnerRef::project(42), tag.id, "bob")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn drafts_take_votes_only_from_their_author() {
        let f = fixture().await;
        let draft = f
            .publications
            .create_owner("alice", OwnerInput::article("Draft", "body"), false)
            .await
            .unwrap();
        let tag = f.engagement.create_tag("rust").await.unwrap();

        let err = f.engagement.vote(draft, tag.id, "bob").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        f.engagement.vote(draft, tag.id, "alice").await.unwrap();

        f.publications.publish("alice", draft).await.unwrap();
        f.engagement.vote(draft, tag.id, "bob").await.unwrap();
        let top = f.engagement.top_tags(draft, 10).await.unwrap();
        assert_eq!(top[0].votes, 2);
    }

    #[tokio::test]
    async fn inactive_voter_is_unauthorized() {
        let f = fixture().await;
        let owner = f
            .publications
            .create_owner("alice", OwnerInput::article("Hello", "body"), true)
            .await
            .unwrap();
        let tag = f.engagement.create_tag("rust").await.unwrap();
        f.users.set_active("bob", false).await.unwrap();

        let err = f.engagement.vote(owner, tag.id, "bob").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn top_tags_orders_by_count_then_tag_id() {
        let f = fixture().await;
        let owner = f
            .publications
            .create_owner("alice", OwnerInput::article("Hello", "body"), true)
            .await
            .unwrap();
        let rust = f.engagement.create_tag("rust").await.unwrap();
        let sql = f.engagement.create_tag("sql").await.unwrap();
        let web = f.engagement.create_tag("web").await.unwrap();

        f.engagement.vote(owner, web.id, "bob").await.unwrap();
        f.engagement.vote(owner, web.id, "carol").await.unwrap();
        f.engagement.vote(owner, sql.id, "bob").await.unwrap();
        f.engagement.vote(owner, rust.id, "carol").await.unwrap();

        let top = f.engagement.top_tags(owner, 50).await.unwrap();
        let names: Vec<&str> = top.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["web", "rust", "sql"]);
        assert_eq!(top[0].votes, 2);

        let again = f.engagement.top_tags(owner, 50).await.unwrap();
        assert_eq!(top, again);

        let limited = f.engagement.top_tags(owner, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn unvote_removes_vote_and_missing_vote_is_not_found() {
        let f = fixture().await;
        let owner = f
            .publications
            .create_owner("alice", OwnerInput::gallery("Shots"), true)
            .await
            .unwrap();
        let tag = f.engagement.create_tag("photo").await.unwrap();

        f.engagement.vote(owner, tag.id, "bob").await.unwrap();
        f.engagement.unvote(owner, tag.id, "bob").await.unwrap();
        assert!(f.engagement.top_tags(owner, 50).await.unwrap().is_empty());

        let err = f.engagement.unvote(owner, tag.id, "bob").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        // voting again after withdrawing is allowed
        f.engagement.vote(owner, tag.id, "bob").await.unwrap();
    }

    #[tokio::test]
    async fn clear_all_votes_empties_aggregate() {
        let f = fixture().await;
        let owner = f
            .publications
            .create_owner("alice", OwnerInput::article("Hello", "body"), true)
            .await
            .unwrap();
        let tag = f.engagement.create_tag("rust").await.unwrap();
        f.engagement.vote(owner, tag.id, "bob").await.unwrap();
        f.engagement.vote(owner, tag.id, "carol").await.unwrap();

        assert_eq!(f.engagement.clear_all_votes(owner).await.unwrap(), 2);
        assert!(f.engagement.top_tags(owner, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_tag_name_is_conflict() {
        let f = fixture().await;
        f.engagement.create_tag("rust").await.unwrap();
        let err = f.engagement.create_tag("rust").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let existing = f.engagement.find_or_create_tag("rust").await.unwrap();
        assert_eq!(existing.name, "rust");
    }

    #[tokio::test]
    async fn search_tags_matches_substrings() {
        let f = fixture().await;
        for name in ["rust", "rustacean", "go", "trust"] {
            f.engagement.create_tag(name).await.unwrap();
        }
        let names: Vec<String> = f
            .engagement
            .search_tags("rust")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["rust", "rustacean", "trust"]);
    }

    #[tokio::test]
    async fn ranking_uses_votes_for_the_tag_only() {
        let f = fixture().await;
        let first = f
            .publications
            .create_owner("alice", OwnerInput::article("First", "body"), true)
            .await
            .unwrap();
        let second = f
            .publications
            .create_owner("alice", OwnerInput::project("Second", "desc", None), true)
            .await
            .unwrap();
        let draft = f
            .publications
            .create_owner("alice", OwnerInput::article("Draft", "body"), false)
            .await
            .unwrap();
        let rust = f.engagement.create_tag("rust").await.unwrap();
        let other = f.engagement.create_tag("other").await.unwrap();

        f.engagement.vote(first, rust.id, "bob").await.unwrap();
        f.engagement.vote(second, rust.id, "bob").await.unwrap();
        f.engagement.vote(second, rust.id, "carol").await.unwrap();
        f.engagement.vote(first, other.id, "carol").await.unwrap();
        f.engagement.vote(draft, rust.id, "alice").await.unwrap();

        let page = f
            .engagement
            .rank_posts_by_tag_votes("rust", PageRequest::new(1, 12))
            .await
            .unwrap();
        let ranked: Vec<(String, i64)> = page
            .items
            .iter()
            .map(|r| (r.post.title.clone(), r.votes))
            .collect();
        assert_eq!(
            ranked,
            vec![("Second".to_string(), 2), ("First".to_string(), 1)]
        );
        assert!(!page.more);

        let err = f
            .engagement
            .rank_posts_by_tag_votes("missing", PageRequest::new(1, 12))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
