//! Tour database operations

use crate::db::models::{CountedEntity, CountedKind, NewTour, Tour, TourPosition};
use crate::slug::slugify;
use crate::{Error, Result};
use chrono::Utc;
use sqlx::SqlitePool;

const TOUR_COLUMNS: &str =
    "id, name, slug, description, is_public, pub_date, timestamp, image_count, video_count";

/// Insert a tour and its members (in the given order); returns the tour id
pub async fn insert_tour(pool: &SqlitePool, tour: &NewTour) -> Result<i64> {
    let name = tour.name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("tour name must not be empty".to_string()));
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let id = sqlx::query(
        r#"
        INSERT INTO tours (name, slug, description, is_public, pub_date, timestamp)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(slugify(name))
    .bind(&tour.description)
    .bind(tour.is_public)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for media_id in &tour.media_ids {
        sqlx::query("INSERT OR IGNORE INTO tour_media (tour_id, media_id) VALUES (?, ?)")
            .bind(id)
            .bind(*media_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(id)
}

/// Load tour by id
pub async fn load_tour(pool: &SqlitePool, id: i64) -> Result<Tour> {
    let sql = format!("SELECT {} FROM tours WHERE id = ?", TOUR_COLUMNS);
    sqlx::query_as::<_, Tour>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tour#{}", id)))
}

/// All tours by name
pub async fn list_tours(pool: &SqlitePool) -> Result<Vec<Tour>> {
    let sql = format!("SELECT {} FROM tours ORDER BY name", TOUR_COLUMNS);
    Ok(sqlx::query_as::<_, Tour>(&sql).fetch_all(pool).await?)
}

/// Save editable tour fields; refreshes slug and modification time
pub async fn update_tour(pool: &SqlitePool, tour: &Tour) -> Result<()> {
    let name = tour.name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("tour name must not be empty".to_string()));
    }

    let result = sqlx::query(
        r#"
        UPDATE tours
        SET name = ?, slug = ?, description = ?, is_public = ?, timestamp = ?
        WHERE id = ?
        "#,
    )
    .bind(name)
    .bind(slugify(name))
    .bind(&tour.description)
    .bind(tour.is_public)
    .bind(Utc::now())
    .bind(tour.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("tour#{}", tour.id)));
    }
    Ok(())
}

/// Tour members in association order
pub async fn tour_media_ids(pool: &SqlitePool, tour_id: i64) -> Result<Vec<i64>> {
    Ok(
        sqlx::query_scalar("SELECT media_id FROM tour_media WHERE tour_id = ? ORDER BY id")
            .bind(tour_id)
            .fetch_all(pool)
            .await?,
    )
}

/// Stored positions of a tour, by position
pub async fn load_tour_positions(pool: &SqlitePool, tour_id: i64) -> Result<Vec<TourPosition>> {
    Ok(sqlx::query_as::<_, TourPosition>(
        "SELECT tour_id, media_id, position FROM tour_positions WHERE tour_id = ? ORDER BY position",
    )
    .bind(tour_id)
    .fetch_all(pool)
    .await?)
}

/// Cite a reference in a tour; returns `false` if already cited
pub async fn link_tour_reference(pool: &SqlitePool, tour_id: i64, reference_id: i64) -> Result<bool> {
    let result =
        sqlx::query("INSERT OR IGNORE INTO tour_references (tour_id, reference_id) VALUES (?, ?)")
            .bind(tour_id)
            .bind(reference_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Drop a citation; returns `false` if there was none
pub async fn unlink_tour_reference(pool: &SqlitePool, tour_id: i64, reference_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tour_references WHERE tour_id = ? AND reference_id = ?")
        .bind(tour_id)
        .bind(reference_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// References cited by a tour, by citation descending
pub async fn tour_references(pool: &SqlitePool, tour_id: i64) -> Result<Vec<CountedEntity>> {
    let rows = sqlx::query(
        r#"
        SELECT r.id, r.name, r.slug, r.image_count, r.video_count
        FROM bib_references r
        JOIN tour_references tr ON tr.reference_id = r.id
        WHERE tr.tour_id = ?
        ORDER BY r.citation DESC, r.name
        "#,
    )
    .bind(tour_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| CountedEntity::from_row(CountedKind::Reference, row).map_err(Error::from))
        .collect()
}
