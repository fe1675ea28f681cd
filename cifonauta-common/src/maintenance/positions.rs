//! Tour positions
//!
//! Positions follow the order in which media joined the tour
//! (`tour_media.id`) and are always `0..N-1` after reassignment.

use crate::db::retry::{retry_on_lock, WRITE_LOCK_WAIT_MS};
use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Rewrite the positions of a tour from its current members
///
/// Runs in one transaction: readers see either the old or the new
/// positions. Retried while another writer holds the database. Returns
/// the number of positions written.
pub async fn reassign_tour_positions(pool: &SqlitePool, tour_id: i64) -> Result<usize> {
    let operation = format!("reassign positions of tour#{}", tour_id);
    let count = retry_on_lock(&operation, WRITE_LOCK_WAIT_MS, || {
        reassign_once(pool, tour_id, &operation)
    })
    .await?;

    debug!(tour_id, positions = count, "Reassigned tour positions");
    Ok(count)
}

async fn reassign_once(pool: &SqlitePool, tour_id: i64, operation: &str) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::persistence(operation, e))?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM tours WHERE id = ?")
        .bind(tour_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(Error::NotFound(format!("tour#{}", tour_id)));
    }

    let media_ids: Vec<i64> =
        sqlx::query_scalar("SELECT media_id FROM tour_media WHERE tour_id = ? ORDER BY id")
            .bind(tour_id)
            .fetch_all(&mut *tx)
            .await?;

    sqlx::query("DELETE FROM tour_positions WHERE tour_id = ?")
        .bind(tour_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::persistence(operation, e))?;

    for (position, media_id) in media_ids.iter().enumerate() {
        sqlx::query("INSERT INTO tour_positions (tour_id, media_id, position) VALUES (?, ?, ?)")
            .bind(tour_id)
            .bind(*media_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::persistence(operation, e))?;
    }

    tx.commit()
        .await
        .map_err(|e| Error::persistence(operation, e))?;

    Ok(media_ids.len())
}

/// Reassign positions of every tour; returns `(tour_id, positions)` pairs
pub async fn reassign_all_tour_positions(pool: &SqlitePool) -> Result<Vec<(i64, usize)>> {
    let tour_ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM tours ORDER BY id")
        .fetch_all(pool)
        .await?;

    let mut results = Vec::with_capacity(tour_ids.len());
    for tour_id in tour_ids {
        let count = reassign_tour_positions(pool, tour_id).await?;
        results.push((tour_id, count));
    }
    Ok(results)
}
