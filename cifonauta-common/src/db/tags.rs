//! Tag categories and tag translations
//!
//! Tags themselves are counted entities (see [`crate::db::entities`]).
//! A tag belongs to at most one category; deleting the category leaves
//! its tags uncategorized.

use crate::db::models::{CountedEntity, CountedKind, Language, TagCategory};
use crate::slug::slugify;
use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::debug;

pub async fn insert_tag_category(
    pool: &SqlitePool,
    name: &str,
    description: &str,
) -> Result<TagCategory> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("tag category name must not be empty".to_string()));
    }

    let id = sqlx::query("INSERT INTO tag_categories (name, slug, description) VALUES (?, ?, ?)")
        .bind(name)
        .bind(slugify(name))
        .bind(description)
        .execute(pool)
        .await?
        .last_insert_rowid();

    load_tag_category(pool, id).await
}

pub async fn load_tag_category(pool: &SqlitePool, id: i64) -> Result<TagCategory> {
    sqlx::query_as::<_, TagCategory>(
        "SELECT id, name, slug, description FROM tag_categories WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("tag category#{}", id)))
}

/// All categories by name
pub async fn list_tag_categories(pool: &SqlitePool) -> Result<Vec<TagCategory>> {
    Ok(sqlx::query_as::<_, TagCategory>(
        "SELECT id, name, slug, description FROM tag_categories ORDER BY name",
    )
    .fetch_all(pool)
    .await?)
}

pub async fn delete_tag_category(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM tag_categories WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("tag category#{}", id)));
    }
    Ok(())
}

/// Put a tag in a category, or take it out with `None`
pub async fn set_tag_category(pool: &SqlitePool, tag_id: i64, category_id: Option<i64>) -> Result<()> {
    if let Some(category_id) = category_id {
        load_tag_category(pool, category_id).await?;
    }

    let result = sqlx::query("UPDATE tags SET category_id = ? WHERE id = ?")
        .bind(category_id)
        .bind(tag_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("tag#{}", tag_id)));
    }
    debug!(tag_id, ?category_id, "Tag category set");
    Ok(())
}

/// Category of a tag, if it has one
pub async fn tag_category(pool: &SqlitePool, tag_id: i64) -> Result<Option<TagCategory>> {
    Ok(sqlx::query_as::<_, TagCategory>(
        r#"
        SELECT c.id, c.name, c.slug, c.description
        FROM tag_categories c
        JOIN tags t ON t.category_id = c.id
        WHERE t.id = ?
        "#,
    )
    .bind(tag_id)
    .fetch_optional(pool)
    .await?)
}

/// Tags of a category by name
pub async fn tags_in_category(pool: &SqlitePool, category_id: i64) -> Result<Vec<CountedEntity>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, slug, image_count, video_count
        FROM tags
        WHERE category_id = ?
        ORDER BY name
        "#,
    )
    .bind(category_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| CountedEntity::from_row(CountedKind::Tag, row).map_err(Error::from))
        .collect()
}

/// English name of a tag; an empty name clears the translation
pub async fn set_tag_translation(pool: &SqlitePool, tag_id: i64, name_en: &str) -> Result<()> {
    let result = sqlx::query("UPDATE tags SET name_en = ? WHERE id = ?")
        .bind(name_en.trim())
        .bind(tag_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("tag#{}", tag_id)));
    }
    Ok(())
}

/// Tag name in `language`, falling back to the Portuguese name
pub fn localized_name<'a>(name: &'a str, name_en: &'a str, language: Language) -> &'a str {
    match language {
        Language::English if !name_en.is_empty() => name_en,
        _ => name,
    }
}
