//! Index Synchronizer.
//!
//! Mirrors owner lifecycle events into the unified `posts` table. Every
//! function runs on the caller's transaction: the owner write and its index
//! mirror commit or roll back together. No other module inserts or updates
//! `posts` rows.

use crate::db::{owner_repo, post_repo};
use crate::error::{AppError, Result};
use crate::metrics::index_sync as metrics;
use crate::models::{OwnerHeader, OwnerRef, Post, PostMirror};
use sqlx::SqliteConnection;
use tracing::{debug, error};

/// Lifecycle events the synchronizer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerEvent {
    Created,
    Saved,
    Deleted,
}

impl OwnerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerEvent::Created => "created",
            OwnerEvent::Saved => "saved",
            OwnerEvent::Deleted => "deleted",
        }
    }
}

fn mirror_of(owner: OwnerRef, header: &OwnerHeader) -> PostMirror<'_> {
    PostMirror {
        owner,
        title: &header.title,
        author: &header.author,
        published: header.published,
        created_at: header.created_at,
        updated_at: header.updated_at,
    }
}

/// Apply `event` for `owner`. Returns the post row as it stands after the
/// event (the removed row for `Deleted`).
pub async fn apply(conn: &mut SqliteConnection, event: OwnerEvent, owner: OwnerRef) -> Result<Post> {
    let result = match event {
        OwnerEvent::Created => on_created(conn, owner).await,
        OwnerEvent::Saved => on_saved(conn, owner).await,
        OwnerEvent::Deleted => on_deleted(conn, owner).await,
    };
    metrics::record(event.as_str(), owner.kind, result.is_ok());
    result
}

/// Insert the post row for a freshly inserted owner. The owner row must
/// already carry its generated id.
async fn on_created(conn: &mut SqliteConnection, owner: OwnerRef) -> Result<Post> {
    let header = load_header(conn, owner).await?;

    if post_repo::find_by_owner(conn, owner).await?.is_some() {
        error!(owner = %owner, "Post row already exists for new owner");
        return Err(AppError::Inconsistency(format!(
            "post row already exists for {}",
            owner
        )));
    }

    let post = post_repo::insert_post(conn, &mirror_of(owner, &header)).await?;
    let tag_ids = owner_repo::tag_ids_of(conn, owner).await?;
    post_repo::replace_tags(conn, post.id, &tag_ids).await?;
    post_repo::replace_votes(conn, post.id, owner).await?;

    debug!(post_id = post.id, owner_type = %owner.kind, owner_id = owner.id, "Post index row created");
    Ok(post)
}

/// Overwrite the denormalized fields and re-associate tags and votes from the
/// owner's current state. A missing post row is never recreated here.
async fn on_saved(conn: &mut SqliteConnection, owner: OwnerRef) -> Result<Post> {
    let header = load_header(conn, owner).await?;
    let post = require_post(conn, owner).await?;

    post_repo::update_mirror(conn, post.id, &mirror_of(owner, &header)).await?;
    let tag_ids = owner_repo::tag_ids_of(conn, owner).await?;
    post_repo::replace_tags(conn, post.id, &tag_ids).await?;
    post_repo::replace_votes(conn, post.id, owner).await?;

    debug!(post_id = post.id, owner_type = %owner.kind, owner_id = owner.id, "Post index row updated");

    post_repo::find_by_id(conn, post.id)
        .await?
        .ok_or_else(|| AppError::Inconsistency(format!("post row for {} vanished", owner)))
}

/// Clear the post's associations, then delete the post row. The caller
/// removes the owner afterwards on the same transaction.
async fn on_deleted(conn: &mut SqliteConnection, owner: OwnerRef) -> Result<Post> {
    let post = require_post(conn, owner).await?;

    post_repo::clear_associations(conn, post.id).await?;
    post_repo::delete_post(conn, post.id).await?;

    debug!(post_id = post.id, owner_type = %owner.kind, owner_id = owner.id, "Post index row deleted");
    Ok(post)
}

/// Re-mirror only the vote associations after a vote change.
pub async fn link_vote(conn: &mut SqliteConnection, owner: OwnerRef, vote_id: i64) -> Result<()> {
    let post = require_post(conn, owner).await?;
    post_repo::link_vote(conn, post.id, vote_id).await?;
    Ok(())
}

async fn load_header(conn: &mut SqliteConnection, owner: OwnerRef) -> Result<OwnerHeader> {
    owner_repo::find_header(conn, owner)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} does not exist", owner)))
}

async fn require_post(conn: &mut SqliteConnection, owner: OwnerRef) -> Result<Post> {
    match post_repo::find_by_owner(conn, owner).await? {
        Some(post) => Ok(post),
        None => {
            error!(owner_type = %owner.kind, owner_id = owner.id, "Owner has no post index row");
            Err(AppError::Inconsistency(format!(
                "no post index row for {}",
                owner
            )))
        }
    }
}
