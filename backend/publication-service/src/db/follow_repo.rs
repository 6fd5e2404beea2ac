use crate::models::{FollowEntry, FollowList, Follower};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

pub async fn find_list(conn: &mut SqliteConnection, owner: &str) -> Result<Option<FollowList>, sqlx::Error> {
    sqlx::query_as::<_, FollowList>("SELECT id, owner FROM follow_lists WHERE owner = ?1")
        .bind(owner)
        .fetch_optional(&mut *conn)
        .await
}

/// Lazily create the follow list of `owner`.
pub async fn find_or_create_list(conn: &mut SqliteConnection, owner: &str) -> Result<FollowList, sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO follow_lists (owner) VALUES (?1)")
        .bind(owner)
        .execute(&mut *conn)
        .await?;

    sqlx::query_as::<_, FollowList>("SELECT id, owner FROM follow_lists WHERE owner = ?1")
        .bind(owner)
        .fetch_one(&mut *conn)
        .await
}

pub async fn insert_follow(
    conn: &mut SqliteConnection,
    list: &FollowList,
    followed: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO follows (follow_list_id, owner, followed, created_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(list.id)
    .bind(&list.owner)
    .bind(followed)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete_follow(conn: &mut SqliteConnection, list_id: i64, followed: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM follows WHERE follow_list_id = ?1 AND followed = ?2")
        .bind(list_id)
        .bind(followed)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn is_following(conn: &mut SqliteConnection, list_id: i64, followed: &str) -> Result<bool, sqlx::Error> {
    let exists: i64 = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM follows WHERE follow_list_id = ?1 AND followed = ?2)",
    )
    .bind(list_id)
    .bind(followed)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists != 0)
}

pub async fn list_following(conn: &mut SqliteConnection, list_id: i64) -> Result<Vec<FollowEntry>, sqlx::Error> {
    sqlx::query_as::<_, FollowEntry>(
        r#"
        SELECT followed, created_at
        FROM follows
        WHERE follow_list_id = ?1
        ORDER BY followed ASC
        "#,
    )
    .bind(list_id)
    .fetch_all(&mut *conn)
    .await
}

/// Active users whose follow list contains `author`.
pub async fn followers_of(conn: &mut SqliteConnection, author: &str) -> Result<Vec<Follower>, sqlx::Error> {
    sqlx::query_as::<_, Follower>(
        r#"
        SELECT u.username, u.email
        FROM follows f
        JOIN follow_lists fl ON fl.id = f.follow_list_id
        JOIN users u ON u.username = fl.owner
        WHERE f.followed = ?1 AND u.active = 1
        ORDER BY u.username ASC
        "#,
    )
    .bind(author)
    .fetch_all(&mut *conn)
    .await
}
