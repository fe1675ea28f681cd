//! Cached media counters
//!
//! A recount always starts from the association tables, never from the
//! stored value, so running it again after missed updates repairs drift.

use crate::db::entities::entity_ids;
use crate::db::models::{Association, CountedKind, EntityCounts, EntityRef};
use crate::{Error, Result};
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Count the photos and videos currently associated with an entity
pub async fn count_media(pool: &SqlitePool, entity: EntityRef) -> Result<EntityCounts> {
    let sql = match entity.kind.association() {
        Association::ManyToMany {
            join_table,
            entity_column,
        } => format!(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN m.datatype = 'photo' THEN 1 ELSE 0 END), 0) AS image_count,
                COALESCE(SUM(CASE WHEN m.datatype = 'video' THEN 1 ELSE 0 END), 0) AS video_count
            FROM media m
            JOIN {} j ON j.media_id = m.id
            WHERE j.{} = ?
            "#,
            join_table, entity_column
        ),
        Association::ForeignKey { media_column } => format!(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN datatype = 'photo' THEN 1 ELSE 0 END), 0) AS image_count,
                COALESCE(SUM(CASE WHEN datatype = 'video' THEN 1 ELSE 0 END), 0) AS video_count
            FROM media
            WHERE {} = ?
            "#,
            media_column
        ),
    };

    let row = sqlx::query(&sql).bind(entity.id).fetch_one(pool).await?;
    Ok(EntityCounts {
        image_count: row.try_get("image_count")?,
        video_count: row.try_get("video_count")?,
    })
}

/// Recount an entity's photos and videos and store the result
///
/// Returns the stored counts. Unknown entities are `NotFound`; a failed
/// write is `PersistenceFailure`.
pub async fn recount(pool: &SqlitePool, entity: EntityRef) -> Result<EntityCounts> {
    let counts = count_media(pool, entity).await?;

    let sql = format!(
        "UPDATE {} SET image_count = ?, video_count = ? WHERE id = ?",
        entity.kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(counts.image_count)
        .bind(counts.video_count)
        .bind(entity.id)
        .execute(pool)
        .await
        .map_err(|e| Error::persistence(format!("recount {}", entity), e))?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(entity.to_string()));
    }

    debug!(
        entity = %entity,
        image_count = counts.image_count,
        video_count = counts.video_count,
        "Recounted"
    );
    Ok(counts)
}

/// Recount every entity of a kind
///
/// Stops at the first failure.
pub async fn recount_all(pool: &SqlitePool, kind: CountedKind) -> Result<Vec<(EntityRef, EntityCounts)>> {
    let mut results = Vec::new();
    for id in entity_ids(pool, kind).await? {
        let entity = EntityRef::new(kind, id);
        let counts = recount(pool, entity).await?;
        results.push((entity, counts));
    }
    Ok(results)
}
