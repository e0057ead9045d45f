//! Database schema migrations
//!
//! Versioned changes applied after the base schema is created. Each
//! migration is idempotent and recorded in `schema_version`.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations**; databases in the field already ran them
//! 2. **Always add new migrations** for schema changes
//! 3. **Use ALTER TABLE / CREATE INDEX IF NOT EXISTS** to preserve data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version, 0 when nothing was recorded
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

/// Migration v1: owner-column indexes for per-user list queries
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: owner indexes");

    let statements = [
        "CREATE INDEX IF NOT EXISTS idx_projects_creator ON projects(creator_id)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_creator ON tasks(creator_id)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_assignee ON tasks(assignee_id)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id)",
        "CREATE INDEX IF NOT EXISTS idx_events_creator ON events(creator_id)",
        "CREATE INDEX IF NOT EXISTS idx_time_records_user ON time_records(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_notes_creator ON notes(creator_id)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_creator_date ON transactions(creator_id, date)",
        "CREATE INDEX IF NOT EXISTS idx_ocr_images_user ON ocr_images(user_id)",
    ];
    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Migration v2: date indexes behind the "today" and expiry views
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: date indexes");

    let statements = [
        "CREATE INDEX IF NOT EXISTS idx_tasks_due_date ON tasks(due_date)",
        "CREATE INDEX IF NOT EXISTS idx_events_start_time ON events(start_time)",
        "CREATE INDEX IF NOT EXISTS idx_items_expiry ON items(expiry_date)",
        "CREATE INDEX IF NOT EXISTS idx_habit_records_date ON habit_records(habit_id, date)",
    ];
    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::create_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_fresh_database_reaches_current_version() {
        let pool = setup().await;
        assert_eq!(get_schema_version(&pool).await.unwrap(), 0);

        run_migrations(&pool).await.unwrap();
        assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);

        let index_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_tasks_due_date'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(index_count, 1);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = setup().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
        assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
    }
}
