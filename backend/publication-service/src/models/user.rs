use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Authority levels stored in `users.authority_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Authority {
    User,
    Moderator,
    Admin,
}

impl Authority {
    pub fn level(&self) -> i64 {
        match self {
            Authority::User => 0,
            Authority::Moderator => 1,
            Authority::Admin => 255,
        }
    }

    pub fn from_level(level: i64) -> Self {
        if level >= Authority::Admin.level() {
            Authority::Admin
        } else if level >= Authority::Moderator.level() {
            Authority::Moderator
        } else {
            Authority::User
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub active: bool,
    pub authority_level: i64,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn authority(&self) -> Authority {
        Authority::from_level(self.authority_level)
    }

    pub fn is_moderator(&self) -> bool {
        self.authority() >= Authority::Moderator
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 200))]
    pub full_name: String,
    pub authority: Authority,
}

impl NewUser {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            full_name: String::new(),
            authority: Authority::User,
        }
    }

    pub fn with_authority(mut self, authority: Authority) -> Self {
        self.authority = authority;
        self
    }
}
