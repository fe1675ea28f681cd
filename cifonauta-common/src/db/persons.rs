//! People credited on media
//!
//! The `authors` table holds every person linked to media. Only those
//! flagged `is_author` are listed as authors; the rest are collaborators
//! such as collectors or identifiers.

use crate::db::models::{CountedEntity, CountedKind};
use crate::{Error, Result};
use sqlx::SqlitePool;

pub async fn set_is_author(pool: &SqlitePool, person_id: i64, is_author: bool) -> Result<()> {
    let result = sqlx::query("UPDATE authors SET is_author = ? WHERE id = ?")
        .bind(is_author)
        .bind(person_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("author#{}", person_id)));
    }
    Ok(())
}

pub async fn is_author(pool: &SqlitePool, person_id: i64) -> Result<bool> {
    sqlx::query_scalar("SELECT is_author FROM authors WHERE id = ?")
        .bind(person_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("author#{}", person_id)))
}

/// People flagged as authors, by name
pub async fn list_credited_authors(pool: &SqlitePool) -> Result<Vec<CountedEntity>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, slug, image_count, video_count
        FROM authors
        WHERE is_author = 1
        ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| CountedEntity::from_row(CountedKind::Author, row).map_err(Error::from))
        .collect()
}
