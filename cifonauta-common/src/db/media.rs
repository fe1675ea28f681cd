//! Media database operations
//!
//! Plain row access. Callers that change associations go through
//! [`crate::Catalog`] so the cached counters get refreshed.

use crate::db::models::{Language, Media, MediaLinks, NewMedia};
use crate::db::tags::localized_name;
use crate::{Error, Result};
use chrono::Utc;
use sqlx::SqlitePool;

const MEDIA_COLUMNS: &str = "id, filepath, datatype, title, caption, is_public, highlight, \
     timestamp, pub_date, size_id, sublocation_id, city_id, state_id, country_id";

/// Insert a media record and return its id
pub async fn insert_media(pool: &SqlitePool, media: &NewMedia) -> Result<i64> {
    if media.filepath.trim().is_empty() {
        return Err(Error::InvalidInput("media filepath must not be empty".to_string()));
    }

    let id = sqlx::query(
        r#"
        INSERT INTO media (
            filepath, datatype, title, caption, is_public, highlight, timestamp, pub_date,
            size_id, sublocation_id, city_id, state_id, country_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&media.filepath)
    .bind(media.datatype.as_str())
    .bind(&media.title)
    .bind(&media.caption)
    .bind(media.is_public)
    .bind(media.highlight)
    .bind(media.timestamp)
    .bind(Utc::now())
    .bind(media.links.size_id)
    .bind(media.links.sublocation_id)
    .bind(media.links.city_id)
    .bind(media.links.state_id)
    .bind(media.links.country_id)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(id)
}

/// Load media by id
pub async fn load_media(pool: &SqlitePool, id: i64) -> Result<Media> {
    let sql = format!("SELECT {} FROM media WHERE id = ?", MEDIA_COLUMNS);
    sqlx::query_as::<_, Media>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("media#{}", id)))
}

/// All media in default order (by id)
pub async fn list_media(pool: &SqlitePool) -> Result<Vec<Media>> {
    let sql = format!("SELECT {} FROM media ORDER BY id", MEDIA_COLUMNS);
    Ok(sqlx::query_as::<_, Media>(&sql).fetch_all(pool).await?)
}

/// Replace the foreign-key metadata of a media item
pub async fn update_media_links(pool: &SqlitePool, id: i64, links: &MediaLinks) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE media
        SET size_id = ?, sublocation_id = ?, city_id = ?, state_id = ?, country_id = ?
        WHERE id = ?
        "#,
    )
    .bind(links.size_id)
    .bind(links.sublocation_id)
    .bind(links.city_id)
    .bind(links.state_id)
    .bind(links.country_id)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("media#{}", id)));
    }
    Ok(())
}

/// Delete a media record; join rows and tour positions cascade
pub async fn delete_media(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM media WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("media#{}", id)));
    }
    Ok(())
}

/// Names of the people linked to a media item, by name
pub async fn author_name_list(pool: &SqlitePool, media_id: i64, separator: &str) -> Result<String> {
    let names: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT a.name FROM authors a
        JOIN author_media am ON am.author_id = a.id
        WHERE am.media_id = ?
        ORDER BY a.name
        "#,
    )
    .bind(media_id)
    .fetch_all(pool)
    .await?;
    Ok(names.join(separator))
}

/// Names of the sources (specialists) linked to a media item, by name
pub async fn source_name_list(pool: &SqlitePool, media_id: i64, separator: &str) -> Result<String> {
    let names: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT s.name FROM sources s
        JOIN source_media sm ON sm.source_id = s.id
        WHERE sm.media_id = ?
        ORDER BY s.name
        "#,
    )
    .bind(media_id)
    .fetch_all(pool)
    .await?;
    Ok(names.join(separator))
}

/// Tag names of a media item in `language`, ordered by Portuguese name
pub async fn tag_name_list(
    pool: &SqlitePool,
    media_id: i64,
    language: Language,
    separator: &str,
) -> Result<String> {
    let names: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT t.name, t.name_en FROM tags t
        JOIN tag_media tm ON tm.tag_id = t.id
        WHERE tm.media_id = ?
        ORDER BY t.name
        "#,
    )
    .bind(media_id)
    .fetch_all(pool)
    .await?;

    Ok(names
        .iter()
        .map(|(name, name_en)| localized_name(name, name_en, language))
        .collect::<Vec<_>>()
        .join(separator))
}
