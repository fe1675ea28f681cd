//! Taxon database operations
//!
//! Structural changes (insert, move, delete) run in one transaction
//! together with the nested-set coordinate update, and are retried while
//! another writer holds the database.

use crate::db::models::{NewTaxon, Taxon};
use crate::db::retry::{retry_on_lock, WRITE_LOCK_WAIT_MS};
use crate::slug::slugify;
use crate::taxonomy::nested_set;
use crate::{Error, Result};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

pub(crate) const TAXON_COLUMNS: &str =
    "id, name, slug, rank, aphia, parent_id, tree_id, lft, rght, level, timestamp";

/// Insert a taxon as the last child of its parent (or as a new root)
pub async fn insert_taxon(pool: &SqlitePool, taxon: &NewTaxon) -> Result<Taxon> {
    let name = taxon.name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("taxon name must not be empty".to_string()));
    }

    let id = retry_on_lock("insert taxon", WRITE_LOCK_WAIT_MS, || {
        insert_taxon_once(pool, name, taxon)
    })
    .await?;

    load_taxon(pool, id).await
}

async fn insert_taxon_once(pool: &SqlitePool, name: &str, taxon: &NewTaxon) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let slot = nested_set::open_slot(&mut *tx, taxon.parent_id).await?;

    let id = sqlx::query(
        r#"
        INSERT INTO taxa (name, slug, rank, aphia, parent_id, tree_id, lft, rght, level, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(slugify(name))
    .bind(taxon.rank.trim())
    .bind(taxon.aphia)
    .bind(taxon.parent_id)
    .bind(slot.tree_id)
    .bind(slot.lft)
    .bind(slot.rght)
    .bind(slot.level)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    tx.commit().await?;

    debug!(id, name, tree_id = slot.tree_id, "Inserted taxon");
    Ok(id)
}

/// Load taxon by id
pub async fn load_taxon(pool: &SqlitePool, id: i64) -> Result<Taxon> {
    let mut conn = pool.acquire().await?;
    fetch_taxon(&mut conn, id).await
}

async fn fetch_taxon(conn: &mut SqliteConnection, id: i64) -> Result<Taxon> {
    let sql = format!("SELECT {} FROM taxa WHERE id = ?", TAXON_COLUMNS);
    sqlx::query_as::<_, Taxon>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("taxon#{}", id)))
}

/// Look a taxon up by its unique name
pub async fn find_taxon_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Taxon>> {
    let sql = format!("SELECT {} FROM taxa WHERE name = ?", TAXON_COLUMNS);
    Ok(sqlx::query_as::<_, Taxon>(&sql)
        .bind(name.trim())
        .fetch_optional(pool)
        .await?)
}

/// Look a taxon up by its WoRMS id
pub async fn find_taxon_by_aphia(pool: &SqlitePool, aphia: i64) -> Result<Option<Taxon>> {
    let sql = format!("SELECT {} FROM taxa WHERE aphia = ? ORDER BY id LIMIT 1", TAXON_COLUMNS);
    Ok(sqlx::query_as::<_, Taxon>(&sql)
        .bind(aphia)
        .fetch_optional(pool)
        .await?)
}

/// All taxa by name
pub async fn list_taxa(pool: &SqlitePool) -> Result<Vec<Taxon>> {
    let sql = format!("SELECT {} FROM taxa ORDER BY name", TAXON_COLUMNS);
    Ok(sqlx::query_as::<_, Taxon>(&sql).fetch_all(pool).await?)
}

/// Set rank and WoRMS id without touching the tree
pub async fn update_taxon_details(
    pool: &SqlitePool,
    id: i64,
    rank: &str,
    aphia: Option<i64>,
) -> Result<()> {
    let result = sqlx::query("UPDATE taxa SET rank = ?, aphia = ?, timestamp = ? WHERE id = ?")
        .bind(rank.trim())
        .bind(aphia)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("taxon#{}", id)));
    }
    Ok(())
}

/// Reparent a taxon (`None` makes it a root) and rebuild the coordinates
///
/// Moving a taxon under itself or one of its descendants is rejected.
pub async fn move_taxon(pool: &SqlitePool, id: i64, new_parent: Option<i64>) -> Result<Taxon> {
    retry_on_lock("move taxon", WRITE_LOCK_WAIT_MS, || {
        move_taxon_once(pool, id, new_parent)
    })
    .await?;

    info!(id, parent = ?new_parent, "Moved taxon");
    load_taxon(pool, id).await
}

async fn move_taxon_once(pool: &SqlitePool, id: i64, new_parent: Option<i64>) -> Result<()> {
    let mut tx = pool.begin().await?;
    let node = fetch_taxon(&mut *tx, id).await?;

    if let Some(parent_id) = new_parent {
        let parent = fetch_taxon(&mut *tx, parent_id).await?;
        let inside = parent.tree_id == node.tree_id
            && parent.lft >= node.lft
            && parent.rght <= node.rght;
        if inside {
            return Err(Error::InvalidInput(format!(
                "cannot move {} under its own subtree ({})",
                node.name, parent.name
            )));
        }
    }

    sqlx::query("UPDATE taxa SET parent_id = ?, timestamp = ? WHERE id = ?")
        .bind(new_parent)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
    nested_set::rebuild(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}

/// Delete a taxon; its children become roots of their own trees
pub async fn delete_taxon(pool: &SqlitePool, id: i64) -> Result<()> {
    retry_on_lock("delete taxon", WRITE_LOCK_WAIT_MS, || delete_taxon_once(pool, id)).await?;

    info!(id, "Deleted taxon");
    Ok(())
}

async fn delete_taxon_once(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE taxa SET parent_id = NULL WHERE parent_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM taxa WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("taxon#{}", id)));
    }

    nested_set::rebuild(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}

/// Tag a media item with a taxon; returns `false` if already tagged
pub async fn link_taxon_media(pool: &SqlitePool, taxon_id: i64, media_id: i64) -> Result<bool> {
    let result = sqlx::query("INSERT OR IGNORE INTO taxon_media (taxon_id, media_id) VALUES (?, ?)")
        .bind(taxon_id)
        .bind(media_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove a taxon tag; returns `false` if there was none
pub async fn unlink_taxon_media(pool: &SqlitePool, taxon_id: i64, media_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM taxon_media WHERE taxon_id = ? AND media_id = ?")
        .bind(taxon_id)
        .bind(media_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Taxa directly tagged on a media item, by name
pub async fn taxa_for_media(pool: &SqlitePool, media_id: i64) -> Result<Vec<Taxon>> {
    let sql = format!(
        r#"
        SELECT {} FROM taxa
        WHERE id IN (SELECT taxon_id FROM taxon_media WHERE media_id = ?)
        ORDER BY name
        "#,
        TAXON_COLUMNS
    );
    Ok(sqlx::query_as::<_, Taxon>(&sql)
        .bind(media_id)
        .fetch_all(pool)
        .await?)
}

/// Taxa needing review: parentless non-kingdoms and unranked taxa
pub async fn list_orphans(pool: &SqlitePool) -> Result<Vec<Taxon>> {
    let sql = format!(
        r#"
        SELECT {} FROM taxa
        WHERE (parent_id IS NULL AND rank != 'Reino') OR rank = ''
        ORDER BY name
        "#,
        TAXON_COLUMNS
    );
    Ok(sqlx::query_as::<_, Taxon>(&sql).fetch_all(pool).await?)
}
