//! Feed/Query façade. Listings read only the post index; detail views read
//! the single owner table the reference points at.

use crate::config::FeedConfig;
use crate::db::{owner_repo, post_repo, tag_repo};
use crate::error::{AppError, Result};
use crate::models::{Owner, OwnerKind, OwnerRef, Page, PageRequest, Post};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct FeedService {
    pool: SqlitePool,
    limits: FeedConfig,
}

impl FeedService {
    pub fn new(pool: SqlitePool, limits: FeedConfig) -> Self {
        Self { pool, limits }
    }

    /// Page request using the configured default size.
    pub fn page(&self, page: u32) -> PageRequest {
        PageRequest::new(page, self.limits.default_page_size)
    }

    /// Global feed of published posts, newest first.
    pub async fn list_feed(&self, request: PageRequest) -> Result<Page<Post>> {
        let window = request.window(self.limits.max_page_size)?;
        let mut conn = self.pool.acquire().await?;
        let items = post_repo::list_published(&mut conn, window).await?;
        Ok(Page::from_window(items, window))
    }

    /// Posts by `author`. Drafts are included only when the viewer is the
    /// author.
    pub async fn list_by_author(
        &self,
        author: &str,
        viewer: Option<&str>,
        request: PageRequest,
    ) -> Result<Page<Post>> {
        let window = request.window(self.limits.max_page_size)?;
        let include_drafts = viewer == Some(author);
        let mut conn = self.pool.acquire().await?;
        let items = post_repo::list_by_author(&mut conn, author, include_drafts, window).await?;
        Ok(Page::from_window(items, window))
    }

    /// Published posts for a tag, ranked by that tag's votes.
    pub async fn list_by_tag(&self, tag_name: &str, request: PageRequest) -> Result<Page<Post>> {
        let window = request.window(self.limits.max_page_size)?;
        let mut conn = self.pool.acquire().await?;
        if tag_repo::find_by_name(&mut conn, tag_name).await?.is_none() {
            return Err(AppError::NotFound(format!("tag '{}'", tag_name)));
        }
        let items = post_repo::rank_by_tag_votes(&mut conn, tag_name, window).await?;
        Ok(Page::from_window(items, window).map(|ranked| ranked.post))
    }

    /// Substring search over published titles.
    pub async fn search(&self, query: &str, request: PageRequest) -> Result<Page<Post>> {
        self.search_in(query, None, request).await
    }

    /// Substring search restricted to one content kind.
    pub async fn search_kind(&self, kind: OwnerKind, query: &str, request: PageRequest) -> Result<Page<Post>> {
        self.search_in(query, Some(kind), request).await
    }

    async fn search_in(&self, query: &str, kind: Option<OwnerKind>, request: PageRequest) -> Result<Page<Post>> {
        let window = request.window(self.limits.max_page_size)?;
        let mut conn = self.pool.acquire().await?;
        let items = post_repo::search(&mut conn, query.trim(), kind, false, window).await?;
        Ok(Page::from_window(items, window))
    }

    /// Full owner entity. Drafts are only visible to their author.
    pub async fn get_owner(&self, owner: OwnerRef, viewer: Option<&str>) -> Result<Owner> {
        let mut conn = self.pool.acquire().await?;
        let found = owner_repo::find_owner(&mut conn, owner)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} does not exist", owner)))?;

        if !found.header.published && viewer != Some(found.header.author.as_str()) {
            return Err(AppError::NotFound(format!("{} does not exist", owner)));
        }
        Ok(found)
    }

    /// Index row for one owner, with the same draft visibility rule.
    pub async fn get_post(&self, owner: OwnerRef, viewer: Option<&str>) -> Result<Post> {
        let mut conn = self.pool.acquire().await?;
        let post = post_repo::find_by_owner(&mut conn, owner)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} does not exist", owner)))?;

        if !post.published && viewer != Some(post.author.as_str()) {
            return Err(AppError::NotFound(format!("{} does not exist", owner)));
        }
        Ok(post)
    }
}
