//! The unified post index. Only the index synchronizer writes here; the feed
//! façade reads.

use crate::models::{OwnerKind, OwnerRef, Post, PostMirror, PostRow, RankedPost, Window};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

pub(crate) const POST_COLUMNS: &str =
    "p.id, p.owner_type, p.owner_id, p.title, p.author, p.published, p.created_at, p.updated_at";

/// Convert storage rows, failing on an unknown `owner_type`.
pub(crate) fn into_posts(rows: Vec<PostRow>) -> Result<Vec<Post>, sqlx::Error> {
    rows.into_iter().map(into_post).collect()
}

pub(crate) fn into_post(row: PostRow) -> Result<Post, sqlx::Error> {
    Post::try_from(row).map_err(|e| sqlx::Error::Decode(e.into()))
}

/// Escape LIKE wildcards and wrap for substring matching.
pub(crate) fn like_pattern(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len() + 2);
    escaped.push('%');
    for ch in fragment.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

pub async fn insert_post(
    conn: &mut SqliteConnection,
    mirror: &PostMirror<'_>,
) -> Result<Post, sqlx::Error> {
    let row = sqlx::query_as::<_, PostRow>(
        r#"
        INSERT INTO posts (owner_type, owner_id, title, author, published, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        RETURNING id, owner_type, owner_id, title, author, published, created_at, updated_at
        "#,
    )
    .bind(mirror.owner.kind.as_str())
    .bind(mirror.owner.id)
    .bind(mirror.title)
    .bind(mirror.author)
    .bind(mirror.published)
    .bind(mirror.created_at)
    .bind(mirror.updated_at)
    .fetch_one(&mut *conn)
    .await?;

    into_post(row)
}

/// Overwrite the denormalized fields of an existing post row.
pub async fn update_mirror(
    conn: &mut SqliteConnection,
    post_id: i64,
    mirror: &PostMirror<'_>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE posts
        SET title = ?1, author = ?2, published = ?3, created_at = ?4, updated_at = ?5
        WHERE id = ?6
        "#,
    )
    .bind(mirror.title)
    .bind(mirror.author)
    .bind(mirror.published)
    .bind(mirror.created_at)
    .bind(mirror.updated_at)
    .bind(post_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn find_by_owner(
    conn: &mut SqliteConnection,
    owner: OwnerRef,
) -> Result<Option<Post>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM posts p WHERE p.owner_type = ?1 AND p.owner_id = ?2",
        POST_COLUMNS
    );
    sqlx::query_as::<_, PostRow>(&sql)
        .bind(owner.kind.as_str())
        .bind(owner.id)
        .fetch_optional(&mut *conn)
        .await?
        .map(into_post)
        .transpose()
}

pub async fn find_by_id(conn: &mut SqliteConnection, post_id: i64) -> Result<Option<Post>, sqlx::Error> {
    let sql = format!("SELECT {} FROM posts p WHERE p.id = ?1", POST_COLUMNS);
    sqlx::query_as::<_, PostRow>(&sql)
        .bind(post_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(into_post)
        .transpose()
}

/// Number of index rows for one owner; anything but 0 or 1 is corruption.
pub async fn count_for_owner(conn: &mut SqliteConnection, owner: OwnerRef) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE owner_type = ?1 AND owner_id = ?2")
        .bind(owner.kind.as_str())
        .bind(owner.id)
        .fetch_one(&mut *conn)
        .await
}

/// Replace the post's tag associations with `tag_ids`.
pub async fn replace_tags(
    conn: &mut SqliteConnection,
    post_id: i64,
    tag_ids: &[i64],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM post_tags WHERE post_id = ?1")
        .bind(post_id)
        .execute(&mut *conn)
        .await?;

    for tag_id in tag_ids {
        sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?1, ?2)")
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Re-derive the post's vote associations from the votes on its owner.
pub async fn replace_votes(
    conn: &mut SqliteConnection,
    post_id: i64,
    owner: OwnerRef,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM post_votes WHERE post_id = ?1")
        .bind(post_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO post_votes (post_id, vote_id)
        SELECT ?1, v.id FROM votes v WHERE v.owner_type = ?2 AND v.owner_id = ?3
        "#,
    )
    .bind(post_id)
    .bind(owner.kind.as_str())
    .bind(owner.id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn link_vote(conn: &mut SqliteConnection, post_id: i64, vote_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO post_votes (post_id, vote_id) VALUES (?1, ?2)")
        .bind(post_id)
        .bind(vote_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Remove every association row (tags, votes, sections) that references the
/// post. Must run before the post row itself is deleted.
pub async fn clear_associations(conn: &mut SqliteConnection, post_id: i64) -> Result<(), sqlx::Error> {
    for sql in [
        "DELETE FROM post_tags WHERE post_id = ?1",
        "DELETE FROM post_votes WHERE post_id = ?1",
        "DELETE FROM section_posts WHERE post_id = ?1",
    ] {
        sqlx::query(sql).bind(post_id).execute(&mut *conn).await?;
    }
    Ok(())
}

pub async fn delete_post(conn: &mut SqliteConnection, post_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM posts WHERE id = ?1")
        .bind(post_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn tag_ids_of_post(conn: &mut SqliteConnection, post_id: i64) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT tag_id FROM post_tags WHERE post_id = ?1 ORDER BY tag_id")
        .bind(post_id)
        .fetch_all(&mut *conn)
        .await
}

pub async fn vote_ids_of_post(conn: &mut SqliteConnection, post_id: i64) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT vote_id FROM post_votes WHERE post_id = ?1 ORDER BY vote_id")
        .bind(post_id)
        .fetch_all(&mut *conn)
        .await
}

/// Published posts, newest first.
pub async fn list_published(conn: &mut SqliteConnection, window: Window) -> Result<Vec<Post>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}
        FROM posts p
        WHERE p.published = 1
        ORDER BY p.created_at DESC, p.id DESC
        LIMIT ?1 OFFSET ?2
        "#,
        POST_COLUMNS
    );
    let rows = sqlx::query_as::<_, PostRow>(&sql)
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&mut *conn)
        .await?;
    into_posts(rows)
}

/// Posts by one author, newest first. Drafts are included only on request.
pub async fn list_by_author(
    conn: &mut SqliteConnection,
    author: &str,
    include_drafts: bool,
    window: Window,
) -> Result<Vec<Post>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}
        FROM posts p
        WHERE p.author = ?1 AND (p.published = 1 OR ?2)
        ORDER BY p.created_at DESC, p.id DESC
        LIMIT ?3 OFFSET ?4
        "#,
        POST_COLUMNS
    );
    let rows = sqlx::query_as::<_, PostRow>(&sql)
        .bind(author)
        .bind(include_drafts)
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&mut *conn)
        .await?;
    into_posts(rows)
}

/// Substring search over titles, optionally restricted to one kind.
pub async fn search(
    conn: &mut SqliteConnection,
    fragment: &str,
    kind: Option<OwnerKind>,
    include_drafts: bool,
    window: Window,
) -> Result<Vec<Post>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}
        FROM posts p
        WHERE p.title LIKE ?1 ESCAPE '\'
          AND (?2 IS NULL OR p.owner_type = ?2)
          AND (p.published = 1 OR ?3)
        ORDER BY p.created_at DESC, p.id DESC
        LIMIT ?4 OFFSET ?5
        "#,
        POST_COLUMNS
    );
    let rows = sqlx::query_as::<_, PostRow>(&sql)
        .bind(like_pattern(fragment))
        .bind(kind.map(|k| k.as_str()))
        .bind(include_drafts)
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&mut *conn)
        .await?;
    into_posts(rows)
}

/// Published posts whose author is in `follower`'s follow list.
pub async fn list_following(
    conn: &mut SqliteConnection,
    follower: &str,
    window: Window,
) -> Result<Vec<Post>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}
        FROM posts p
        WHERE p.published = 1
          AND p.author IN (
              SELECT f.followed
              FROM follows f
              JOIN follow_lists fl ON fl.id = f.follow_list_id
              WHERE fl.owner = ?1
          )
        ORDER BY p.created_at DESC, p.id DESC
        LIMIT ?2 OFFSET ?3
        "#,
        POST_COLUMNS
    );
    let rows = sqlx::query_as::<_, PostRow>(&sql)
        .bind(follower)
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&mut *conn)
        .await?;
    into_posts(rows)
}

#[derive(Debug, sqlx::FromRow)]
struct RankedPostRow {
    id: i64,
    owner_type: String,
    owner_id: i64,
    title: String,
    author: String,
    published: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    votes: i64,
}

/// Published posts carrying or voted with `tag_name`, ordered by the number of
/// votes for that tag (ties by post id).
pub async fn rank_by_tag_votes(
    conn: &mut SqliteConnection,
    tag_name: &str,
    window: Window,
) -> Result<Vec<RankedPost>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}, COUNT(v.id) AS votes
        FROM posts p
        JOIN tags t ON t.name = ?1
        LEFT JOIN post_votes pv ON pv.post_id = p.id
        LEFT JOIN votes v ON v.id = pv.vote_id AND v.tag_id = t.id
        WHERE p.published = 1
        GROUP BY p.id
        HAVING COUNT(v.id) > 0
            OR EXISTS (SELECT 1 FROM post_tags pt WHERE pt.post_id = p.id AND pt.tag_id = t.id)
        ORDER BY votes DESC, p.id ASC
        LIMIT ?2 OFFSET ?3
        "#,
        POST_COLUMNS
    );
    let rows = sqlx::query_as::<_, RankedPostRow>(&sql)
        .bind(tag_name)
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter()
        .map(|row| {
            let post = into_post(PostRow {
                id: row.id,
                owner_type: row.owner_type,
                owner_id: row.owner_id,
                title: row.title,
                author: row.author,
                published: row.published,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })?;
            Ok(RankedPost {
                post,
                votes: row.votes,
            })
        })
        .collect()
}

/// Every index row, drafts included, for moderation.
pub async fn list_all(
    conn: &mut SqliteConnection,
    fragment: Option<&str>,
    window: Window,
) -> Result<Vec<Post>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}
        FROM posts p
        WHERE (?1 IS NULL OR p.title LIKE ?1 ESCAPE '\')
        ORDER BY p.created_at DESC, p.id DESC
        LIMIT ?2 OFFSET ?3
        "#,
        POST_COLUMNS
    );
    let rows = sqlx::query_as::<_, PostRow>(&sql)
        .bind(fragment.map(like_pattern))
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&mut *conn)
        .await?;
    into_posts(rows)
}

pub async fn count_posts(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM posts")
        .fetch_one(&mut *conn)
        .await
}
