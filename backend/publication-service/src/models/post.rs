use super::owner::{OwnerKind, OwnerRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Denormalized index record mirroring one owner entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub owner: OwnerRef,
    pub title: String,
    pub author: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage shape of a `posts` row; `owner_type` is converted at the boundary.
#[derive(Debug, sqlx::FromRow)]
pub struct PostRow {
    pub id: i64,
    pub owner_type: String,
    pub owner_id: i64,
    pub title: String,
    pub author: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PostRow> for Post {
    type Error = String;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        let kind: OwnerKind = row.owner_type.parse()?;
        Ok(Post {
            id: row.id,
            owner: OwnerRef::new(kind, row.owner_id),
            title: row.title,
            author: row.author,
            published: row.published,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A post together with the number of votes its tag received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedPost {
    pub post: Post,
    pub votes: i64,
}

/// Denormalized fields copied from an owner into its post row.
#[derive(Debug, Clone)]
pub struct PostMirror<'a> {
    pub owner: OwnerRef,
    pub title: &'a str,
    pub author: &'a str,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
