use super::owner::{OwnerKind, OwnerRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const TAG_PALETTE: [&str; 5] = ["#C84630", "#FFB627", "#219797", "#6113CD", "#1A5E63"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

impl Tag {
    /// Display colour, stable for a given name.
    pub fn colour(&self) -> &'static str {
        tag_colour(&self.name)
    }
}

pub fn tag_colour(name: &str) -> &'static str {
    let sum: usize = name.bytes().map(usize::from).sum();
    TAG_PALETTE[sum % TAG_PALETTE.len()]
}

/// Aggregated vote count of one tag on one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TagVotes {
    pub tag_id: i64,
    pub name: String,
    pub votes: i64,
}

impl TagVotes {
    pub fn colour(&self) -> &'static str {
        tag_colour(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: i64,
    pub tag_id: i64,
    pub voter: String,
    pub owner: OwnerRef,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct VoteRow {
    pub id: i64,
    pub tag_id: i64,
    pub voter: String,
    pub owner_type: String,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<VoteRow> for Vote {
    type Error = String;

    fn try_from(row: VoteRow) -> Result<Self, Self::Error> {
        let kind: OwnerKind = row.owner_type.parse()?;
        Ok(Vote {
            id: row.id,
            tag_id: row.tag_id,
            voter: row.voter,
            owner: OwnerRef::new(kind, row.owner_id),
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_is_deterministic_and_from_palette() {
        let first = tag_colour("rust");
        assert_eq!(first, tag_colour("rust"));
        assert!(TAG_PALETTE.contains(&first));
    }

    #[test]
    fn colour_uses_byte_sum_modulo_palette() {
        // "a" = 97, 97 % 5 = 2
        assert_eq!(tag_colour("a"), "#219797");
        assert_eq!(tag_colour(""), "#C84630");
    }
}
