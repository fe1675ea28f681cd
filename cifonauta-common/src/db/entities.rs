//! Counted entity database operations
//!
//! Authors, sources, tags, size classes, places, references and tours share
//! one table shape (`id`, `name`, `slug`, `image_count`, `video_count`), so
//! a single set of queries parameterized by [`CountedKind`] serves them all.
//! Table and column names come from `CountedKind`, never from callers.

use crate::db::models::{Association, CountedEntity, CountedKind, EntityRef};
use crate::slug::slugify;
use crate::{Error, Result};
use sqlx::SqlitePool;

/// Insert a new entity with a slug derived from its name
pub async fn insert_entity(
    pool: &SqlitePool,
    kind: CountedKind,
    name: &str,
) -> Result<CountedEntity> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput(format!("{} name must not be empty", kind)));
    }

    let sql = format!("INSERT INTO {} (name, slug) VALUES (?, ?)", kind.table());
    let id = sqlx::query(&sql)
        .bind(name)
        .bind(slugify(name))
        .execute(pool)
        .await?
        .last_insert_rowid();

    tracing::debug!(kind = %kind, id, name, "Inserted entity");

    load_entity(pool, EntityRef::new(kind, id)).await
}

/// Load one entity
pub async fn load_entity(pool: &SqlitePool, entity: EntityRef) -> Result<CountedEntity> {
    let sql = format!(
        "SELECT id, name, slug, image_count, video_count FROM {} WHERE id = ?",
        entity.kind.table()
    );
    let row = sqlx::query(&sql)
        .bind(entity.id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(entity.to_string()))?;

    Ok(CountedEntity::from_row(entity.kind, &row)?)
}

/// Look an entity up by its unique name
pub async fn find_entity_by_name(
    pool: &SqlitePool,
    kind: CountedKind,
    name: &str,
) -> Result<Option<CountedEntity>> {
    let sql = format!(
        "SELECT id, name, slug, image_count, video_count FROM {} WHERE name = ?",
        kind.table()
    );
    let row = sqlx::query(&sql).bind(name).fetch_optional(pool).await?;

    match row {
        Some(row) => Ok(Some(CountedEntity::from_row(kind, &row)?)),
        None => Ok(None),
    }
}

/// Find an entity by name, creating it when missing
pub async fn get_or_insert_entity(
    pool: &SqlitePool,
    kind: CountedKind,
    name: &str,
) -> Result<CountedEntity> {
    match find_entity_by_name(pool, kind, name.trim()).await? {
        Some(entity) => Ok(entity),
        None => insert_entity(pool, kind, name).await,
    }
}

/// All entities of a kind in display order
///
/// Size classes are ordered by their position, everything else by name.
pub async fn list_entities(pool: &SqlitePool, kind: CountedKind) -> Result<Vec<CountedEntity>> {
    let order = if kind == CountedKind::Size { "position, name" } else { "name" };
    let sql = format!(
        "SELECT id, name, slug, image_count, video_count FROM {} ORDER BY {}",
        kind.table(),
        order
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    rows.iter()
        .map(|row| CountedEntity::from_row(kind, row).map_err(Error::from))
        .collect()
}

/// Ids of every entity of a kind
pub async fn entity_ids(pool: &SqlitePool, kind: CountedKind) -> Result<Vec<i64>> {
    let sql = format!("SELECT id FROM {} ORDER BY id", kind.table());
    Ok(sqlx::query_scalar(&sql).fetch_all(pool).await?)
}

/// Delete an entity
///
/// Join rows cascade and media foreign keys are cleared, so no counter
/// needs refreshing afterwards.
pub async fn delete_entity(pool: &SqlitePool, entity: EntityRef) -> Result<()> {
    let sql = format!("DELETE FROM {} WHERE id = ?", entity.kind.table());
    let result = sqlx::query(&sql).bind(entity.id).execute(pool).await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(entity.to_string()));
    }
    Ok(())
}

fn join_table(kind: CountedKind) -> Result<(&'static str, &'static str)> {
    match kind.association() {
        Association::ManyToMany {
            join_table,
            entity_column,
        } => Ok((join_table, entity_column)),
        Association::ForeignKey { media_column } => Err(Error::InvalidInput(format!(
            "{} is linked through media.{}, not a join table",
            kind, media_column
        ))),
    }
}

/// Link a media item to a many-to-many entity
///
/// Returns `false` if the link already existed.
pub async fn link_media(pool: &SqlitePool, entity: EntityRef, media_id: i64) -> Result<bool> {
    let (table, column) = join_table(entity.kind)?;
    let sql = format!(
        "INSERT OR IGNORE INTO {} ({}, media_id) VALUES (?, ?)",
        table, column
    );
    let result = sqlx::query(&sql)
        .bind(entity.id)
        .bind(media_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Remove a media link; returns `false` if there was none
pub async fn unlink_media(pool: &SqlitePool, entity: EntityRef, media_id: i64) -> Result<bool> {
    let (table, column) = join_table(entity.kind)?;
    let sql = format!("DELETE FROM {} WHERE {} = ? AND media_id = ?", table, column);
    let result = sqlx::query(&sql)
        .bind(entity.id)
        .bind(media_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Every counted entity a media item contributes to
///
/// Covers join-table memberships and the media row's own foreign keys.
/// Must be read before the media row is deleted: the links cascade away.
pub async fn entities_for_media(pool: &SqlitePool, media_id: i64) -> Result<Vec<EntityRef>> {
    let mut refs = Vec::new();

    for kind in CountedKind::ALL {
        match kind.association() {
            Association::ManyToMany {
                join_table,
                entity_column,
            } => {
                let sql = format!(
                    "SELECT {} FROM {} WHERE media_id = ? ORDER BY {}",
                    entity_column, join_table, entity_column
                );
                let ids: Vec<i64> = sqlx::query_scalar(&sql)
                    .bind(media_id)
                    .fetch_all(pool)
                    .await?;
                refs.extend(ids.into_iter().map(|id| EntityRef::new(kind, id)));
            }
            Association::ForeignKey { media_column } => {
                let sql = format!("SELECT {} FROM media WHERE id = ?", media_column);
                let id: Option<Option<i64>> = sqlx::query_scalar(&sql)
                    .bind(media_id)
                    .fetch_optional(pool)
                    .await?;
                if let Some(id) = id.flatten() {
                    refs.push(EntityRef::new(kind, id));
                }
            }
        }
    }

    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;

    #[tokio::test]
    async fn test_insert_sets_slug_and_zero_counts() {
        let pool = init_memory_database().await.unwrap();

        let author = insert_entity(&pool, CountedKind::Author, "Álvaro E. Migotto")
            .await
            .expect("insert author");

        assert_eq!(author.slug, "alvaro-e-migotto");
        assert_eq!(author.counts.image_count, 0);
        assert_eq!(author.counts.video_count, 0);
    }

    #[tokio::test]
    async fn test_insert_rejects_blank_name() {
        let pool = init_memory_database().await.unwrap();
        let result = insert_entity(&pool, CountedKind::Tag, "   ").await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_get_or_insert_is_stable() {
        let pool = init_memory_database().await.unwrap();

        let first = get_or_insert_entity(&pool, CountedKind::City, "Ubatuba").await.unwrap();
        let second = get_or_insert_entity(&pool, CountedKind::City, "Ubatuba").await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_sizes_are_listed_by_position() {
        let pool = init_memory_database().await.unwrap();

        let names: Vec<String> = list_entities(&pool, CountedKind::Size)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();

        assert_eq!(
            names,
            vec!["<0,1 mm", "0,1 - 1,0 mm", "1,0 - 10 mm", "10 - 100 mm", ">100 mm"]
        );
    }

    #[tokio::test]
    async fn test_link_rejects_foreign_key_kinds() {
        let pool = init_memory_database().await.unwrap();
        let result = link_media(&pool, EntityRef::new(CountedKind::Country, 1), 1).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_load_missing_entity_is_not_found() {
        let pool = init_memory_database().await.unwrap();
        let result = load_entity(&pool, EntityRef::new(CountedKind::Source, 99)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_entity_clears_links() {
        use crate::db::media::{insert_media, load_media};
        use crate::db::models::{MediaKind, MediaLinks, NewMedia};

        let pool = init_memory_database().await.unwrap();
        let author = insert_entity(&pool, CountedKind::Author, "Jane").await.unwrap();
        let city = insert_entity(&pool, CountedKind::City, "Ubatuba").await.unwrap();
        let media_id = insert_media(
            &pool,
            &NewMedia::new("a.jpg", MediaKind::Photo).with_links(MediaLinks {
                city_id: Some(city.id),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        link_media(&pool, author.entity_ref(), media_id).await.unwrap();
        assert_eq!(entities_for_media(&pool, media_id).await.unwrap().len(), 2);

        delete_entity(&pool, author.entity_ref()).await.unwrap();
        delete_entity(&pool, city.entity_ref()).await.unwrap();

        assert!(entities_for_media(&pool, media_id).await.unwrap().is_empty());
        assert_eq!(load_media(&pool, media_id).await.unwrap().links.city_id, None);
        assert!(matches!(
            load_entity(&pool, author.entity_ref()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_entity_is_not_found() {
        let pool = init_memory_database().await.unwrap();
        let result = delete_entity(&pool, EntityRef::new(CountedKind::Tag, 42)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
