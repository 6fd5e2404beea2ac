use crate::models::{NewUser, User};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

pub async fn insert_user(conn: &mut SqliteConnection, user: &NewUser, now: DateTime<Utc>) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, full_name, active, authority_level, created_at)
        VALUES (?1, ?2, ?3, 1, ?4, ?5)
        RETURNING id, username, email, full_name, active, authority_level, created_at
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.full_name)
    .bind(user.authority.level())
    .bind(now)
    .fetch_one(&mut *conn)
    .await
}

pub async fn find_by_username(conn: &mut SqliteConnection, username: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, email, full_name, active, authority_level, created_at
        FROM users
        WHERE username = ?1
        "#,
    )
    .bind(username)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn set_active(conn: &mut SqliteConnection, username: &str, active: bool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET active = ?1 WHERE username = ?2")
        .bind(active)
        .bind(username)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count_users(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&mut *conn)
        .await
}
