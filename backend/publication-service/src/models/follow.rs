use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's adjacency set of followed users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowList {
    pub id: i64,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowEntry {
    pub followed: String,
    pub created_at: DateTime<Utc>,
}

/// Follower resolved for notification delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Follower {
    pub username: String,
    pub email: String,
}
