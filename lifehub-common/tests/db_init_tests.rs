//! Database bootstrap across restarts

use lifehub_common::config::{database_path, ensure_root_folder, TomlConfig};
use lifehub_common::db::init_database;
use lifehub_common::db::migrations::{get_schema_version, CURRENT_SCHEMA_VERSION};
use lifehub_common::db::settings::{get_setting_or, set_setting};
use tempfile::TempDir;

#[tokio::test]
async fn test_reopen_keeps_data_and_custom_settings() {
    let dir = TempDir::new().unwrap();
    ensure_root_folder(dir.path()).unwrap();
    let path = database_path(dir.path());

    {
        let pool = init_database(&path).await.unwrap();
        set_setting(&pool, "ocr_batch_limit", "5").await.unwrap();
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, date_joined, updated_at)
             VALUES ('u1', 'alice', 'alice@example.com', 'x', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;
    }

    let pool = init_database(&path).await.unwrap();
    assert_eq!(get_setting_or(&pool, "ocr_batch_limit", 20usize).await.unwrap(), 5);
    assert!(get_setting_or(&pool, "registration_open", false).await.unwrap());
    assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);

    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(users, 1);
}

#[test]
fn test_load_reads_explicit_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        root_folder = "/srv/lifehub"

        [rate_limit]
        per_minute = 5

        [providers]
        ocr_language = "eng"
        "#,
    )
    .unwrap();

    let config = TomlConfig::load(Some(&path)).unwrap();
    assert_eq!(config.root_folder.as_deref(), Some("/srv/lifehub"));
    assert_eq!(config.rate_limit.per_minute, 5);
    assert!(config.rate_limit.enabled);
    assert_eq!(config.providers.ocr_language, "eng");
    assert_eq!(config.server.port, 8000);
}
