use crate::models::{OwnerRef, TagVotes, Vote, VoteRow};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

pub async fn vote_exists(
    conn: &mut SqliteConnection,
    tag_id: i64,
    voter: &str,
    owner: OwnerRef,
) -> Result<bool, sqlx::Error> {
    let exists: i64 = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM votes
            WHERE tag_id = ?1 AND voter = ?2 AND owner_type = ?3 AND owner_id = ?4
        )
        "#,
    )
    .bind(tag_id)
    .bind(voter)
    .bind(owner.kind.as_str())
    .bind(owner.id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(exists != 0)
}

pub async fn insert_vote(
    conn: &mut SqliteConnection,
    tag_id: i64,
    voter: &str,
    owner: OwnerRef,
    now: DateTime<Utc>,
) -> Result<Vote, sqlx::Error> {
    let row = sqlx::query_as::<_, VoteRow>(
        r#"
        INSERT INTO votes (tag_id, voter, owner_type, owner_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        RETURNING id, tag_id, voter, owner_type, owner_id, created_at
        "#,
    )
    .bind(tag_id)
    .bind(voter)
    .bind(owner.kind.as_str())
    .bind(owner.id)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Vote::try_from(row).map_err(|e| sqlx::Error::Decode(e.into()))
}

pub async fn find_vote_id(
    conn: &mut SqliteConnection,
    tag_id: i64,
    voter: &str,
    owner: OwnerRef,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT id FROM votes
        WHERE tag_id = ?1 AND voter = ?2 AND owner_type = ?3 AND owner_id = ?4
        "#,
    )
    .bind(tag_id)
    .bind(voter)
    .bind(owner.kind.as_str())
    .bind(owner.id)
    .fetch_optional(&mut *conn)
    .await
}

/// Delete one vote together with its post association.
pub async fn delete_vote(conn: &mut SqliteConnection, vote_id: i64) -> Result<u64, sqlx::Error> {
    sqlx::query("DELETE FROM post_votes WHERE vote_id = ?1")
        .bind(vote_id)
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query("DELETE FROM votes WHERE id = ?1")
        .bind(vote_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Delete every vote on an owner together with their post associations.
pub async fn clear_votes(conn: &mut SqliteConnection, owner: OwnerRef) -> Result<u64, sqlx::Error> {
    sqlx::query(
        r#"
        DELETE FROM post_votes
        WHERE vote_id IN (SELECT id FROM votes WHERE owner_type = ?1 AND owner_id = ?2)
        "#,
    )
    .bind(owner.kind.as_str())
    .bind(owner.id)
    .execute(&mut *conn)
    .await?;

    let result = sqlx::query("DELETE FROM votes WHERE owner_type = ?1 AND owner_id = ?2")
        .bind(owner.kind.as_str())
        .bind(owner.id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Vote counts per tag on one owner, highest first, ties by tag id.
pub async fn top_tags(
    conn: &mut SqliteConnection,
    owner: OwnerRef,
    limit: i64,
) -> Result<Vec<TagVotes>, sqlx::Error> {
    sqlx::query_as::<_, TagVotes>(
        r#"
        SELECT t.id AS tag_id, t.name, COUNT(v.id) AS votes
        FROM votes v
        JOIN tags t ON t.id = v.tag_id
        WHERE v.owner_type = ?1 AND v.owner_id = ?2
        GROUP BY t.id, t.name
        ORDER BY votes DESC, t.id ASC
        LIMIT ?3
        "#,
    )
    .bind(owner.kind.as_str())
    .bind(owner.id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await
}

pub async fn count_for_owner(conn: &mut SqliteConnection, owner: OwnerRef) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM votes WHERE owner_type = ?1 AND owner_id = ?2")
        .bind(owner.kind.as_str())
        .bind(owner.id)
        .fetch_one(&mut *conn)
        .await
}
