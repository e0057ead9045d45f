//! Key-value settings table accessors

use crate::Result;
use sqlx::SqlitePool;
use std::str::FromStr;

/// Raw setting value, `None` when absent or NULL
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(value.flatten())
}

/// Parsed setting value, falling back to `default` when absent or unparseable
pub async fn get_setting_or<T: FromStr>(pool: &SqlitePool, key: &str, default: T) -> Result<T> {
    Ok(get_setting(pool, key)
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(default))
}

/// Insert or replace a setting
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::create_settings_table;

    async fn setup() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_settings_table(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let pool = setup().await;
        assert_eq!(get_setting(&pool, "k").await.unwrap(), None);
        set_setting(&pool, "k", "v1").await.unwrap();
        set_setting(&pool, "k", "v2").await.unwrap();
        assert_eq!(get_setting(&pool, "k").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn test_get_setting_or_parses() {
        let pool = setup().await;
        set_setting(&pool, "limit", "42").await.unwrap();
        set_setting(&pool, "broken", "abc").await.unwrap();
        assert_eq!(get_setting_or(&pool, "limit", 1i64).await.unwrap(), 42);
        assert_eq!(get_setting_or(&pool, "broken", 7i64).await.unwrap(), 7);
        assert_eq!(get_setting_or(&pool, "missing", true).await.unwrap(), true);
    }
}
