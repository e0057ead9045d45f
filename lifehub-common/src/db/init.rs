//! Database initialization
//!
//! Opens (or creates) the SQLite file, applies connection pragmas, creates
//! every table idempotently, runs versioned migrations and seeds default
//! settings.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas on the connect options apply to every pooled connection
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create every table (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_user_tables(pool).await?;
    create_task_tables(pool).await?;
    create_time_tables(pool).await?;
    create_knowledge_tables(pool).await?;
    create_life_tables(pool).await?;
    create_ocr_tables(pool).await?;
    create_service_tables(pool).await?;
    Ok(())
}

async fn execute_all(pool: &SqlitePool, statements: &[&str]) -> Result<()> {
    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }
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

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_user_tables(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                avatar TEXT,
                timezone TEXT NOT NULL DEFAULT 'Asia/Shanghai',
                theme TEXT NOT NULL DEFAULT 'auto' CHECK (theme IN ('light', 'dark', 'auto')),
                is_active INTEGER NOT NULL DEFAULT 1,
                date_joined TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                notification_enabled INTEGER NOT NULL DEFAULT 1,
                email_notifications INTEGER NOT NULL DEFAULT 1,
                push_notifications INTEGER NOT NULL DEFAULT 1,
                language TEXT NOT NULL DEFAULT 'zh-hans',
                working_hours_start TEXT NOT NULL DEFAULT '09:00:00',
                working_hours_end TEXT NOT NULL DEFAULT '18:00:00'
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS revoked_tokens (
                jti TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at TEXT NOT NULL,
                revoked_at TEXT NOT NULL
            )
            "#,
        ],
    )
    .await
}

async fn create_task_tables(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                start_date TEXT,
                end_date TEXT,
                status TEXT NOT NULL DEFAULT 'planning'
                    CHECK (status IN ('planning', 'active', 'completed', 'archived')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS project_members (
                project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (project_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                priority TEXT NOT NULL DEFAULT 'medium' CHECK (priority IN ('high', 'medium', 'low')),
                status TEXT NOT NULL DEFAULT 'todo'
                    CHECK (status IN ('todo', 'in_progress', 'blocked', 'completed')),
                due_date TEXT,
                parent_id TEXT REFERENCES tasks(id) ON DELETE CASCADE,
                project_id TEXT REFERENCES projects(id) ON DELETE CASCADE,
                creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                assignee_id TEXT REFERENCES users(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS task_dependencies (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                depends_on_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                UNIQUE (task_id, depends_on_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS task_comments (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        ],
    )
    .await
}

async fn create_time_tables(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS calendars (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                color TEXT NOT NULL DEFAULT '#1890ff',
                creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                is_default INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                event_type TEXT NOT NULL DEFAULT 'work' CHECK (event_type IN ('work', 'life', 'health')),
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                timezone_offset INTEGER NOT NULL DEFAULT 0,
                is_all_day INTEGER NOT NULL DEFAULT 0,
                location TEXT NOT NULL DEFAULT '',
                calendar_id TEXT NOT NULL REFERENCES calendars(id) ON DELETE CASCADE,
                creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                reminder_minutes INTEGER NOT NULL DEFAULT 15,
                reminder_sent INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS event_participants (
                event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (event_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS time_records (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                task_id TEXT REFERENCES tasks(id) ON DELETE SET NULL,
                description TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                duration_minutes INTEGER,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS pomodoro_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                task_id TEXT REFERENCES tasks(id) ON DELETE SET NULL,
                work_duration INTEGER NOT NULL DEFAULT 25,
                break_duration INTEGER NOT NULL DEFAULT 5,
                long_break_duration INTEGER NOT NULL DEFAULT 15,
                sessions_completed INTEGER NOT NULL DEFAULT 0,
                current_session_type TEXT NOT NULL DEFAULT 'work'
                    CHECK (current_session_type IN ('work', 'break', 'long_break')),
                start_time TEXT NOT NULL,
                end_time TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS efficiency_records (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                date TEXT NOT NULL,
                focus_hours REAL NOT NULL DEFAULT 0,
                tasks_completed INTEGER NOT NULL DEFAULT 0,
                tasks_planned INTEGER NOT NULL DEFAULT 0,
                efficiency_score REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, date)
            )
            "#,
        ],
    )
    .await
}

async fn create_knowledge_tables(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                color TEXT NOT NULL DEFAULT '#666666',
                creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                UNIQUE (name, creator_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                format_type TEXT NOT NULL DEFAULT 'richtext' CHECK (format_type IN ('richtext', 'markdown')),
                creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS note_tags (
                note_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (note_id, tag_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS note_links (
                id TEXT PRIMARY KEY,
                from_note_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                to_note_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                UNIQUE (from_note_id, to_note_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS note_versions (
                id TEXT PRIMARY KEY,
                note_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                version_number INTEGER NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                modifier_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                UNIQUE (note_id, version_number)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS resources (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                file_path TEXT NOT NULL DEFAULT '',
                file_type TEXT NOT NULL
                    CHECK (file_type IN ('document', 'image', 'video', 'audio', 'other')),
                file_size INTEGER NOT NULL DEFAULT 0,
                description TEXT NOT NULL DEFAULT '',
                creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS resource_tags (
                resource_id TEXT NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
                tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (resource_id, tag_id)
            )
            "#,
        ],
    )
    .await
}

async fn create_life_tables(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS packages (
                id TEXT PRIMARY KEY,
                tracking_number TEXT NOT NULL,
                courier TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                current_status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (current_status IN ('pending', 'in_transit', 'out_for_delivery', 'delivered')),
                current_location TEXT NOT NULL DEFAULT '',
                last_update TEXT,
                is_delivered INTEGER NOT NULL DEFAULT 0,
                has_exception INTEGER NOT NULL DEFAULT 0,
                creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (tracking_number, creator_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS package_status (
                id TEXT PRIMARY KEY,
                package_id TEXT NOT NULL REFERENCES packages(id) ON DELETE CASCADE,
                time TEXT NOT NULL,
                location TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                quantity INTEGER NOT NULL DEFAULT 1,
                location TEXT NOT NULL DEFAULT '',
                expiry_date TEXT,
                is_expired INTEGER NOT NULL DEFAULT 0,
                description TEXT NOT NULL DEFAULT '',
                creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS habits (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                target_days INTEGER NOT NULL DEFAULT 30,
                reminder_enabled INTEGER NOT NULL DEFAULT 1,
                reminder_time TEXT NOT NULL DEFAULT '09:00:00',
                is_active INTEGER NOT NULL DEFAULT 1,
                current_streak INTEGER NOT NULL DEFAULT 0,
                longest_streak INTEGER NOT NULL DEFAULT 0,
                total_days INTEGER NOT NULL DEFAULT 0,
                creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS habit_records (
                id TEXT PRIMARY KEY,
                habit_id TEXT NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
                date TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 1,
                notes TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                UNIQUE (habit_id, date)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS meal_records (
                id TEXT PRIMARY KEY,
                meal_type TEXT NOT NULL CHECK (meal_type IN ('breakfast', 'lunch', 'dinner', 'snack')),
                description TEXT NOT NULL,
                calories INTEGER,
                notes TEXT NOT NULL DEFAULT '',
                creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS budgets (
                id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                amount REAL NOT NULL,
                period TEXT NOT NULL DEFAULT 'monthly' CHECK (period IN ('monthly', 'yearly')),
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                spent_amount REAL NOT NULL DEFAULT 0,
                percentage_used REAL NOT NULL DEFAULT 0,
                creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (category, period, creator_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                amount REAL NOT NULL,
                transaction_type TEXT NOT NULL CHECK (transaction_type IN ('income', 'expense')),
                category TEXT NOT NULL,
                description TEXT NOT NULL,
                date TEXT NOT NULL,
                time TEXT,
                budget_id TEXT REFERENCES budgets(id) ON DELETE SET NULL,
                creator_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL
            )
            "#,
        ],
    )
    .await
}

async fn create_ocr_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ocr_images (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            image_path TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            extracted_text TEXT NOT NULL DEFAULT '',
            confidence_score REAL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
            error_message TEXT NOT NULL DEFAULT '',
            ocr_provider TEXT NOT NULL DEFAULT 'tesseract',
            processing_time REAL,
            tags TEXT NOT NULL DEFAULT '[]',
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_service_tables(pool: &SqlitePool) -> Result<()> {
    execute_all(
        pool,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS weather_records (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                city TEXT NOT NULL,
                country TEXT NOT NULL DEFAULT '',
                temperature REAL NOT NULL,
                feels_like REAL NOT NULL,
                humidity INTEGER NOT NULL,
                pressure REAL NOT NULL,
                wind_speed REAL NOT NULL,
                wind_direction INTEGER NOT NULL,
                visibility REAL,
                weather_main TEXT NOT NULL,
                weather_description TEXT NOT NULL,
                weather_icon TEXT NOT NULL,
                sunrise TEXT,
                sunset TEXT,
                data_time TEXT NOT NULL,
                provider TEXT NOT NULL DEFAULT 'openweather',
                api_response TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS translation_records (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                source_text TEXT NOT NULL,
                target_text TEXT NOT NULL,
                source_language TEXT NOT NULL,
                target_language TEXT NOT NULL,
                provider TEXT NOT NULL,
                confidence REAL,
                processing_time REAL,
                api_response TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS map_locations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                address TEXT NOT NULL DEFAULT '',
                city TEXT NOT NULL DEFAULT '',
                province TEXT NOT NULL DEFAULT '',
                country TEXT NOT NULL DEFAULT '',
                postal_code TEXT NOT NULL DEFAULT '',
                location_type TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                provider TEXT NOT NULL,
                api_response TEXT NOT NULL DEFAULT '{}',
                tags TEXT NOT NULL DEFAULT '[]',
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        ],
    )
    .await
}

/// Initialize or update default settings
///
/// Ensures all required settings exist with default values and resets NULL
/// values to their defaults.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "registration_open", "true").await?;
    ensure_setting(pool, "ocr_max_image_bytes", "10485760").await?;
    ensure_setting(pool, "ocr_batch_limit", "20").await?;
    ensure_setting(pool, "max_page_size", "100").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// A missing setting is created; an existing NULL value is reset.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // INSERT OR IGNORE tolerates two servers racing on first start
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}
