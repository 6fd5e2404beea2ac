use crate::db::post_repo::{into_posts, POST_COLUMNS};
use crate::models::{Post, PostRow, Section, Window};
use sqlx::SqliteConnection;

pub async fn insert_section(conn: &mut SqliteConnection, owner: &str, name: &str) -> Result<Section, sqlx::Error> {
    sqlx::query_as::<_, Section>(
        "INSERT INTO sections (name, owner) VALUES (?1, ?2) RETURNING id, name, owner",
    )
    .bind(name)
    .bind(owner)
    .fetch_one(&mut *conn)
    .await
}

pub async fn find_section(
    conn: &mut SqliteConnection,
    owner: &str,
    name: &str,
) -> Result<Option<Section>, sqlx::Error> {
    sqlx::query_as::<_, Section>("SELECT id, name, owner FROM sections WHERE owner = ?1 AND name = ?2")
        .bind(owner)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn list_sections(conn: &mut SqliteConnection, owner: &str) -> Result<Vec<Section>, sqlx::Error> {
    sqlx::query_as::<_, Section>("SELECT id, name, owner FROM sections WHERE owner = ?1 ORDER BY name ASC")
        .bind(owner)
        .fetch_all(&mut *conn)
        .await
}

/// Delete a section and its memberships.
pub async fn delete_section(conn: &mut SqliteConnection, section_id: i64) -> Result<u64, sqlx::Error> {
    sqlx::query("DELETE FROM section_posts WHERE section_id = ?1")
        .bind(section_id)
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query("DELETE FROM sections WHERE id = ?1")
        .bind(section_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn insert_membership(conn: &mut SqliteConnection, section_id: i64, post_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO section_posts (section_id, post_id) VALUES (?1, ?2)")
        .bind(section_id)
        .bind(post_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn has_membership(conn: &mut SqliteConnection, section_id: i64, post_id: i64) -> Result<bool, sqlx::Error> {
    let exists: i64 = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM section_posts WHERE section_id = ?1 AND post_id = ?2)",
    )
    .bind(section_id)
    .bind(post_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists != 0)
}

pub async fn delete_membership(conn: &mut SqliteConnection, section_id: i64, post_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM section_posts WHERE section_id = ?1 AND post_id = ?2")
        .bind(section_id)
        .bind(post_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count_memberships_of_post(conn: &mut SqliteConnection, post_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM section_posts WHERE post_id = ?1")
        .bind(post_id)
        .fetch_one(&mut *conn)
        .await
}

/// Posts in a section, newest first. Drafts only when requested.
pub async fn list_section_posts(
    conn: &mut SqliteConnection,
    section_id: i64,
    include_drafts: bool,
    window: Window,
) -> Result<Vec<Post>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}
        FROM posts p
        JOIN section_posts sp ON sp.post_id = p.id
        WHERE sp.section_id = ?1 AND (p.published = 1 OR ?2)
        ORDER BY p.created_at DESC, p.id DESC
        LIMIT ?3 OFFSET ?4
        "#,
        POST_COLUMNS
    );
    let rows = sqlx::query_as::<_, PostRow>(&sql)
        .bind(section_id)
        .bind(include_drafts)
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&mut *conn)
        .await?;
    into_posts(rows)
}

/// The owner's posts that are not yet in the section.
pub async fn list_posts_not_in_section(
    conn: &mut SqliteConnection,
    section: &Section,
    window: Window,
) -> Result<Vec<Post>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}
        FROM posts p
        WHERE p.author = ?1
          AND p.id NOT IN (SELECT sp.post_id FROM section_posts sp WHERE sp.section_id = ?2)
        ORDER BY p.created_at DESC, p.id DESC
        LIMIT ?3 OFFSET ?4
        "#,
        POST_COLUMNS
    );
    let rows = sqlx::query_as::<_, PostRow>(&sql)
        .bind(&section.owner)
        .bind(section.id)
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&mut *conn)
        .await?;
    into_posts(rows)
}
