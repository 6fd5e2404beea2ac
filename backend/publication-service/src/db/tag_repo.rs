use crate::db::post_repo::like_pattern;
use crate::models::{OwnerRef, Tag};
use sqlx::SqliteConnection;

pub async fn insert_tag(conn: &mut SqliteConnection, name: &str) -> Result<Tag, sqlx::Error> {
    sqlx::query_as::<_, Tag>("INSERT INTO tags (name) VALUES (?1) RETURNING id, name")
        .bind(name)
        .fetch_one(&mut *conn)
        .await
}

pub async fn find_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<Tag>, sqlx::Error> {
    sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE name = ?1")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn find_by_id(conn: &mut SqliteConnection, tag_id: i64) -> Result<Option<Tag>, sqlx::Error> {
    sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE id = ?1")
        .bind(tag_id)
        .fetch_optional(&mut *conn)
        .await
}

/// Return the tag named `name`, creating it if needed.
pub async fn find_or_create(conn: &mut SqliteConnection, name: &str) -> Result<Tag, sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?1)")
        .bind(name)
        .execute(&mut *conn)
        .await?;

    sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE name = ?1")
        .bind(name)
        .fetch_one(&mut *conn)
        .await
}

pub async fn search(conn: &mut SqliteConnection, fragment: &str, limit: i64) -> Result<Vec<Tag>, sqlx::Error> {
    sqlx::query_as::<_, Tag>(
        r#"
        SELECT id, name
        FROM tags
        WHERE name LIKE ?1 ESCAPE '\'
        ORDER BY name ASC
        LIMIT ?2
        "#,
    )
    .bind(like_pattern(fragment))
    .bind(limit)
    .fetch_all(&mut *conn)
    .await
}

/// Tags attached to one owner, resolved through its post row.
pub async fn tags_of_owner(conn: &mut SqliteConnection, owner: OwnerRef) -> Result<Vec<Tag>, sqlx::Error> {
    sqlx::query_as::<_, Tag>(
        r#"
        SELECT t.id, t.name
        FROM tags t
        JOIN post_tags pt ON pt.tag_id = t.id
        JOIN posts p ON p.id = pt.post_id
        WHERE p.owner_type = ?1 AND p.owner_id = ?2
        ORDER BY t.name ASC
        "#,
    )
    .bind(owner.kind.as_str())
    .bind(owner.id)
    .fetch_all(&mut *conn)
    .await
}
