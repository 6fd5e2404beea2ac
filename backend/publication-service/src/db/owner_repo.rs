//! Content store: the three owner tables, their tag join tables and gallery
//! images.

use crate::models::{
    Image, NewImage, Owner, OwnerBody, OwnerContent, OwnerHeader, OwnerInput, OwnerKind, OwnerRef,
};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

/// Table names backing one owner kind.
struct KindTables {
    owner: &'static str,
    tags: &'static str,
    tag_fk: &'static str,
}

fn tables(kind: OwnerKind) -> KindTables {
    match kind {
        OwnerKind::Article => KindTables {
            owner: "articles",
            tags: "article_tags",
            tag_fk: "article_id",
        },
        OwnerKind::Project => KindTables {
            owner: "projects",
            tags: "project_tags",
            tag_fk: "project_id",
        },
        OwnerKind::Gallery => KindTables {
            owner: "galleries",
            tags: "gallery_tags",
            tag_fk: "gallery_id",
        },
    }
}

/// Insert a new owner row and return its generated id.
pub async fn insert_owner(
    conn: &mut SqliteConnection,
    author: &str,
    input: &OwnerInput,
    published: bool,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let row = match &input.content {
        OwnerContent::Article { content } => {
            sqlx::query(
                r#"
                INSERT INTO articles (title, author, published, content, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                RETURNING id
                "#,
            )
            .bind(&input.title)
            .bind(author)
            .bind(published)
            .bind(content)
            .bind(now)
            .fetch_one(&mut *conn)
            .await?
        }
        OwnerContent::Project(fields) => {
            sqlx::query(
                r#"
                INSERT INTO projects (title, author, published, description, link, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                RETURNING id
                "#,
            )
            .bind(&input.title)
            .bind(author)
            .bind(published)
            .bind(&fields.description)
            .bind(fields.link.as_deref().unwrap_or(""))
            .bind(now)
            .fetch_one(&mut *conn)
            .await?
        }
        OwnerContent::Gallery => {
            sqlx::query(
                r#"
                INSERT INTO galleries (title, author, published, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?4)
                RETURNING id
                "#,
            )
            .bind(&input.title)
            .bind(author)
            .bind(published)
            .bind(now)
            .fetch_one(&mut *conn)
            .await?
        }
    };

    row.try_get("id")
}

/// Overwrite the editable fields of an owner. Returns false when the owner
/// does not exist.
pub async fn update_owner(
    conn: &mut SqliteConnection,
    id: i64,
    input: &OwnerInput,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = match &input.content {
        OwnerContent::Article { content } => {
            sqlx::query(
                "UPDATE articles SET title = ?1, content = ?2, updated_at = ?3 WHERE id = ?4",
            )
            .bind(&input.title)
            .bind(content)
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await?
        }
        OwnerContent::Project(fields) => {
            sqlx::query(
                r#"
                UPDATE projects
                SET title = ?1, description = ?2, link = ?3, updated_at = ?4
                WHERE id = ?5
                "#,
            )
            .bind(&input.title)
            .bind(&fields.description)
            .bind(fields.link.as_deref().unwrap_or(""))
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await?
        }
        OwnerContent::Gallery => {
            sqlx::query("UPDATE galleries SET title = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(&input.title)
                .bind(now)
                .bind(id)
                .execute(&mut *conn)
                .await?
        }
    };

    Ok(result.rows_affected() > 0)
}

/// Bump `updated_at` after a sub-entity change (tags, images).
pub async fn touch_owner(
    conn: &mut SqliteConnection,
    owner: OwnerRef,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let sql = format!("UPDATE {} SET updated_at = ?1 WHERE id = ?2", tables(owner.kind).owner);
    sqlx::query(&sql)
        .bind(now)
        .bind(owner.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Flip the owner to published. Returns false if it already was.
pub async fn mark_published(
    conn: &mut SqliteConnection,
    owner: OwnerRef,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let sql = format!(
        "UPDATE {} SET published = 1, updated_at = ?1 WHERE id = ?2 AND published = 0",
        tables(owner.kind).owner
    );
    let result = sqlx::query(&sql)
        .bind(now)
        .bind(owner.id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn find_header(
    conn: &mut SqliteConnection,
    owner: OwnerRef,
) -> Result<Option<OwnerHeader>, sqlx::Error> {
    let sql = format!(
        "SELECT id, title, author, published, created_at, updated_at FROM {} WHERE id = ?1",
        tables(owner.kind).owner
    );
    sqlx::query_as::<_, OwnerHeader>(&sql)
        .bind(owner.id)
        .fetch_optional(&mut *conn)
        .await
}

/// Load an owner with its kind-specific body.
pub async fn find_owner(
    conn: &mut SqliteConnection,
    owner: OwnerRef,
) -> Result<Option<Owner>, sqlx::Error> {
    let Some(header) = find_header(conn, owner).await? else {
        return Ok(None);
    };

    let body = match owner.kind {
        OwnerKind::Article => {
            let content: String = sqlx::query_scalar("SELECT content FROM articles WHERE id = ?1")
                .bind(owner.id)
                .fetch_one(&mut *conn)
                .await?;
            OwnerBody::Article { content }
        }
        OwnerKind::Project => {
            let row = sqlx::query("SELECT description, link FROM projects WHERE id = ?1")
                .bind(owner.id)
                .fetch_one(&mut *conn)
                .await?;
            OwnerBody::Project {
                description: row.try_get("description")?,
                link: row.try_get("link")?,
            }
        }
        OwnerKind::Gallery => OwnerBody::Gallery {
            images: list_images(conn, owner.id).await?,
        },
    };

    Ok(Some(Owner { header, body }))
}

pub async fn delete_owner(conn: &mut SqliteConnection, owner: OwnerRef) -> Result<u64, sqlx::Error> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", tables(owner.kind).owner);
    let result = sqlx::query(&sql)
        .bind(owner.id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count_owners(conn: &mut SqliteConnection, kind: OwnerKind) -> Result<i64, sqlx::Error> {
    let sql = format!("SELECT COUNT(*) FROM {}", tables(kind).owner);
    sqlx::query_scalar(&sql).fetch_one(&mut *conn).await
}

/// Attach a tag to the owner's kind join table. Returns false if it was
/// already attached.
pub async fn attach_tag(
    conn: &mut SqliteConnection,
    owner: OwnerRef,
    tag_id: i64,
) -> Result<bool, sqlx::Error> {
    let t = tables(owner.kind);
    let sql = format!(
        "INSERT OR IGNORE INTO {} ({}, tag_id) VALUES (?1, ?2)",
        t.tags, t.tag_fk
    );
    let result = sqlx::query(&sql)
        .bind(owner.id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn detach_tag(
    conn: &mut SqliteConnection,
    owner: OwnerRef,
    tag_id: i64,
) -> Result<bool, sqlx::Error> {
    let t = tables(owner.kind);
    let sql = format!("DELETE FROM {} WHERE {} = ?1 AND tag_id = ?2", t.tags, t.tag_fk);
    let result = sqlx::query(&sql)
        .bind(owner.id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn tag_ids_of(conn: &mut SqliteConnection, owner: OwnerRef) -> Result<Vec<i64>, sqlx::Error> {
    let t = tables(owner.kind);
    let sql = format!(
        "SELECT tag_id FROM {} WHERE {} = ?1 ORDER BY tag_id",
        t.tags, t.tag_fk
    );
    sqlx::query_scalar(&sql)
        .bind(owner.id)
        .fetch_all(&mut *conn)
        .await
}

pub async fn clear_tags(conn: &mut SqliteConnection, owner: OwnerRef) -> Result<u64, sqlx::Error> {
    let t = tables(owner.kind);
    let sql = format!("DELETE FROM {} WHERE {} = ?1", t.tags, t.tag_fk);
    let result = sqlx::query(&sql)
        .bind(owner.id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn list_images(conn: &mut SqliteConnection, gallery_id: i64) -> Result<Vec<Image>, sqlx::Error> {
    sqlx::query_as::<_, Image>(
        r#"
        SELECT id, gallery_id, position, footer, image_url, thumb_url, delete_url
        FROM images
        WHERE gallery_id = ?1
        ORDER BY position ASC
        "#,
    )
    .bind(gallery_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn count_images(conn: &mut SqliteConnection, gallery_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM images WHERE gallery_id = ?1")
        .bind(gallery_id)
        .fetch_one(&mut *conn)
        .await
}

/// Append an image at the end of the gallery's ordering.
pub async fn insert_image(
    conn: &mut SqliteConnection,
    gallery_id: i64,
    owner: &str,
    image: &NewImage,
) -> Result<Image, sqlx::Error> {
    sqlx::query_as::<_, Image>(
        r#"
        INSERT INTO images (gallery_id, owner, position, footer, image_url, thumb_url, delete_url)
        VALUES (
            ?1,
            ?2,
            (SELECT COALESCE(MAX(position), -1) + 1 FROM images WHERE gallery_id = ?1),
            ?3,
            ?4,
            ?5,
            ?6
        )
        RETURNING id, gallery_id, position, footer, image_url, thumb_url, delete_url
        "#,
    )
    .bind(gallery_id)
    .bind(owner)
    .bind(&image.footer)
    .bind(&image.image_url)
    .bind(image.thumb_url.as_deref().unwrap_or(""))
    .bind(image.delete_url.as_deref().unwrap_or(""))
    .fetch_one(&mut *conn)
    .await
}

/// Remove one image and close the gap in the ordering.
pub async fn delete_image(
    conn: &mut SqliteConnection,
    gallery_id: i64,
    image_id: i64,
) -> Result<bool, sqlx::Error> {
    let position: Option<i64> =
        sqlx::query_scalar("SELECT position FROM images WHERE id = ?1 AND gallery_id = ?2")
            .bind(image_id)
            .bind(gallery_id)
            .fetch_optional(&mut *conn)
            .await?;

    let Some(position) = position else {
        return Ok(false);
    };

    sqlx::query("DELETE FROM images WHERE id = ?1")
        .bind(image_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("UPDATE images SET position = position - 1 WHERE gallery_id = ?1 AND position > ?2")
        .bind(gallery_id)
        .bind(position)
        .execute(&mut *conn)
        .await?;

    Ok(true)
}

pub async fn clear_images(conn: &mut SqliteConnection, gallery_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM images WHERE gallery_id = ?1")
        .bind(gallery_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
