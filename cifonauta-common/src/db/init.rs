//! Database initialization
//!
//! Creates the catalog schema on first run and opens existing databases
//! without touching their data. Every statement is idempotent.

use crate::db::models::SizeClass;
use crate::slug::slugify;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Schema version written by this code
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory catalog
///
/// Single connection, so every query sees the same database. Used by tests
/// and dry runs.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every catalog table, index and seed row
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;

    // Authors are people; only some of them are credited as media authors
    create_named_counted_table(pool, "authors", "is_author INTEGER NOT NULL DEFAULT 0,").await?;
    for table in ["sources", "sublocations", "cities", "states", "countries"] {
        create_named_counted_table(pool, table, "").await?;
    }
    create_tag_categories_table(pool).await?;
    create_named_counted_table(
        pool,
        "tags",
        "description TEXT NOT NULL DEFAULT '', name_en TEXT NOT NULL DEFAULT '', \
         category_id INTEGER REFERENCES tag_categories(id) ON DELETE SET NULL,",
    )
    .await?;
    create_named_counted_table(
        pool,
        "sizes",
        "description TEXT NOT NULL DEFAULT '', position INTEGER NOT NULL DEFAULT 0,",
    )
    .await?;
    create_named_counted_table(pool, "bib_references", "citation TEXT NOT NULL DEFAULT '',")
        .await?;
    create_tours_table(pool).await?;
    create_tour_references_table(pool).await?;

    create_media_table(pool).await?;
    create_taxa_table(pool).await?;

    // Linking tables
    for (table, column, parent) in [
        ("author_media", "author_id", "authors"),
        ("source_media", "source_id", "sources"),
        ("tag_media", "tag_id", "tags"),
        ("reference_media", "reference_id", "bib_references"),
        ("taxon_media", "taxon_id", "taxa"),
    ] {
        create_link_table(pool, table, column, parent).await?;
    }
    create_tour_media_tables(pool).await?;

    // Columns added in version 2; tables created above already have them
    ensure_column(pool, "authors", "is_author", "INTEGER NOT NULL DEFAULT 0").await?;
    ensure_column(pool, "tags", "name_en", "TEXT NOT NULL DEFAULT ''").await?;
    ensure_column(
        pool,
        "tags",
        "category_id",
        "INTEGER REFERENCES tag_categories(id) ON DELETE SET NULL",
    )
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tags_category ON tags(category_id)")
        .execute(pool)
        .await?;

    seed_size_classes(pool).await?;
    record_schema_version(pool).await?;

    debug!("Catalog schema ready (v{})", CURRENT_SCHEMA_VERSION);
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn record_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(CURRENT_SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

/// Latest schema version recorded in the database (0 if none)
pub async fn schema_version(pool: &SqlitePool) -> Result<i64> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

/// Create a table with the columns every counted entity shares
///
/// `extra_columns` is spliced in verbatim and must end with a comma.
async fn create_named_counted_table(
    pool: &SqlitePool,
    table: &'static str,
    extra_columns: &'static str,
) -> Result<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            slug TEXT NOT NULL DEFAULT '',
            {extra_columns}
            image_count INTEGER NOT NULL DEFAULT 0 CHECK (image_count >= 0),
            video_count INTEGER NOT NULL DEFAULT 0 CHECK (video_count >= 0)
        )
        "#
    );
    sqlx::query(&sql).execute(pool).await?;

    let index = format!("CREATE INDEX IF NOT EXISTS idx_{table}_slug ON {table}(slug)");
    sqlx::query(&index).execute(pool).await?;

    Ok(())
}

async fn create_tours_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tours (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            slug TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            is_public INTEGER NOT NULL DEFAULT 0,
            pub_date TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            image_count INTEGER NOT NULL DEFAULT 0 CHECK (image_count >= 0),
            video_count INTEGER NOT NULL DEFAULT 0 CHECK (video_count >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tag_categories_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tag_categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            slug TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Bibliography of a tour; not counted
async fn create_tour_references_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tour_references (
            tour_id INTEGER NOT NULL REFERENCES tours(id) ON DELETE CASCADE,
            reference_id INTEGER NOT NULL REFERENCES bib_references(id) ON DELETE CASCADE,
            PRIMARY KEY (tour_id, reference_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Add `column` to an existing table unless it is already there
///
/// `definition` must be valid for `ALTER TABLE ... ADD COLUMN`: no UNIQUE
/// or PRIMARY KEY, and a constant default for NOT NULL columns.
async fn ensure_column(
    pool: &SqlitePool,
    table: &'static str,
    column: &'static str,
    definition: &'static str,
) -> Result<()> {
    let present: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;
    if present > 0 {
        return Ok(());
    }

    info!("Adding column {}.{}", table, column);
    let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition);
    match sqlx::query(&sql).execute(pool).await {
        Ok(_) => Ok(()),
        // Another connection initializing the same file got there first
        Err(e) if e.to_string().contains("duplicate column name") => {
            warn!("Column {}.{} already added", table, column);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn create_media_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filepath TEXT NOT NULL UNIQUE,
            datatype TEXT NOT NULL CHECK (datatype IN ('photo', 'video')),
            title TEXT NOT NULL DEFAULT '',
            caption TEXT NOT NULL DEFAULT '',
            is_public INTEGER NOT NULL DEFAULT 0,
            highlight INTEGER NOT NULL DEFAULT 0,
            timestamp TIMESTAMP NOT NULL,
            pub_date TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            size_id INTEGER REFERENCES sizes(id) ON DELETE SET NULL,
            sublocation_id INTEGER REFERENCES sublocations(id) ON DELETE SET NULL,
            city_id INTEGER REFERENCES cities(id) ON DELETE SET NULL,
            state_id INTEGER REFERENCES states(id) ON DELETE SET NULL,
            country_id INTEGER REFERENCES countries(id) ON DELETE SET NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for column in ["size_id", "sublocation_id", "city_id", "state_id", "country_id"] {
        let index = format!("CREATE INDEX IF NOT EXISTS idx_media_{column} ON media({column})");
        sqlx::query(&index).execute(pool).await?;
    }

    Ok(())
}

async fn create_taxa_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS taxa (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            slug TEXT NOT NULL DEFAULT '',
            rank TEXT NOT NULL DEFAULT '',
            aphia INTEGER,
            parent_id INTEGER REFERENCES taxa(id) ON DELETE SET NULL,
            tree_id INTEGER NOT NULL,
            lft INTEGER NOT NULL,
            rght INTEGER NOT NULL,
            level INTEGER NOT NULL DEFAULT 0,
            timestamp TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Ancestor lookups are range scans within one tree
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_taxa_tree_range ON taxa(tree_id, lft, rght)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_taxa_parent ON taxa(parent_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_link_table(
    pool: &SqlitePool,
    table: &'static str,
    column: &'static str,
    parent: &'static str,
) -> Result<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            {column} INTEGER NOT NULL REFERENCES {parent}(id) ON DELETE CASCADE,
            media_id INTEGER NOT NULL REFERENCES media(id) ON DELETE CASCADE,
            PRIMARY KEY ({column}, media_id)
        )
        "#
    );
    sqlx::query(&sql).execute(pool).await?;

    let index = format!("CREATE INDEX IF NOT EXISTS idx_{table}_media ON {table}(media_id)");
    sqlx::query(&index).execute(pool).await?;

    Ok(())
}

/// `tour_media` keeps an explicit row id: its order is the tour order
async fn create_tour_media_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tour_media (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tour_id INTEGER NOT NULL REFERENCES tours(id) ON DELETE CASCADE,
            media_id INTEGER NOT NULL REFERENCES media(id) ON DELETE CASCADE,
            UNIQUE (tour_id, media_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tour_media_media ON tour_media(media_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tour_positions (
            tour_id INTEGER NOT NULL REFERENCES tours(id) ON DELETE CASCADE,
            media_id INTEGER NOT NULL REFERENCES media(id) ON DELETE CASCADE,
            position INTEGER NOT NULL CHECK (position >= 0),
            PRIMARY KEY (tour_id, media_id),
            UNIQUE (tour_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn seed_size_classes(pool: &SqlitePool) -> Result<()> {
    for size in SizeClass::ALL {
        sqlx::query(
            "INSERT OR IGNORE INTO sizes (name, slug, position) VALUES (?, ?, ?)",
        )
        .bind(size.label())
        .bind(slugify(size.label()))
        .bind(size.position())
        .execute(pool)
        .await?;
    }

    Ok(())
}
