//! Database module for SQLite persistence.
//!
//! SQLite holds stores, templates, section/block rows, the customization log,
//! and draft/published snapshots. Themes are not stored; they live in the catalog.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stores (
            id TEXT PRIMARY KEY,
            subdomain TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            theme_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS templates (
            id TEXT PRIMARY KEY,
            store_id TEXT NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
            template_type TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 1,
            enabled INTEGER NOT NULL DEFAULT 1,
            has_empty_sections INTEGER NOT NULL DEFAULT 0,
            seeded_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Positions are kept dense inside transactions; no unique index on them,
    // since renumbering passes through transient duplicates.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sections (
            id TEXT PRIMARY KEY,
            template_id TEXT NOT NULL REFERENCES templates(id) ON DELETE CASCADE,
            section_type TEXT NOT NULL,
            position INTEGER NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            settings TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Only top-level blocks are rows; nested children travel inside `settings`.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blocks (
            section_id TEXT NOT NULL REFERENCES sections(id) ON DELETE CASCADE,
            id TEXT NOT NULL,
            block_type TEXT NOT NULL,
            position INTEGER NOT NULL,
            settings TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (section_id, id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS customizations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            store_id TEXT NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
            template_id TEXT NOT NULL,
            op TEXT NOT NULL,
            section_id TEXT NOT NULL,
            block_id TEXT,
            payload TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS publish_state (
            store_id TEXT PRIMARY KEY REFERENCES stores(id) ON DELETE CASCADE,
            change_seq INTEGER NOT NULL DEFAULT 0,
            saved_seq INTEGER NOT NULL DEFAULT 0,
            is_draft INTEGER NOT NULL DEFAULT 0,
            last_saved_at TEXT,
            published_at TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS template_snapshots (
            store_id TEXT NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
            template_type TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('draft', 'published')),
            sections TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (store_id, template_type, kind)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_templates_default
            ON templates(store_id, template_type) WHERE is_default = 1;
        CREATE INDEX IF NOT EXISTS idx_sections_template ON sections(template_id, position);
        CREATE INDEX IF NOT EXISTS idx_blocks_section ON blocks(section_id, position);
        CREATE INDEX IF NOT EXISTS idx_customizations_store ON customizations(store_id, id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
