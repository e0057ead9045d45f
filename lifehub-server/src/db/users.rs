//! Users, profiles and revoked refresh tokens

use chrono::{DateTime, NaiveTime, Utc};
use lifehub_common::models::Theme;
use lifehub_common::{time, uuid_utils};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{ApiError, ApiResult};

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, avatar, timezone, theme, is_active, date_joined, updated_at";

/// Public view of a user (no password hash)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub timezone: String,
    pub theme: Theme,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Notification and working-hours preferences
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProfileRow {
    pub notification_enabled: bool,
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub language: String,
    pub working_hours_start: NaiveTime,
    pub working_hours_end: NaiveTime,
}

/// Stored credentials for login
#[derive(Debug, sqlx::FromRow)]
pub struct Credentials {
    pub id: String,
    pub password_hash: String,
    pub is_active: bool,
}

/// Validated account fields
#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Validated changes to the account itself
#[derive(Debug, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar: Option<Option<String>>,
    pub timezone: Option<String>,
    pub theme: Option<Theme>,
}

/// Changes to the preferences
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub notification_enabled: Option<bool>,
    pub email_notifications: Option<bool>,
    pub push_notifications: Option<bool>,
    pub language: Option<String>,
    pub working_hours_start: Option<NaiveTime>,
    pub working_hours_end: Option<NaiveTime>,
}

pub async fn find_by_id(db: &SqlitePool, id: &str) -> ApiResult<UserRow> {
    sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

/// Id of the user registered with `email`
pub async fn find_id_by_email(db: &SqlitePool, email: &str) -> ApiResult<Option<String>> {
    Ok(sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(db)
        .await?)
}

pub async fn credentials_by_email(db: &SqlitePool, email: &str) -> ApiResult<Option<Credentials>> {
    Ok(sqlx::query_as("SELECT id, password_hash, is_active FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(db)
        .await?)
}

pub async fn password_hash(db: &SqlitePool, id: &str) -> ApiResult<String> {
    sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

/// Insert a user together with a default profile
pub async fn create(db: &SqlitePool, user: NewUser) -> ApiResult<UserRow> {
    let id = uuid_utils::generate();
    let now = time::now();

    let mut tx = db.begin().await?;
    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, date_joined, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    sqlx::query("INSERT INTO user_profiles (user_id) VALUES (?)")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    find_by_id(db, &id).await
}

pub async fn update(db: &SqlitePool, id: &str, changes: UserChanges) -> ApiResult<UserRow> {
    let current = find_by_id(db, id).await?;
    sqlx::query(
        "UPDATE users SET username = ?, email = ?, first_name = ?, last_name = ?, avatar = ?,
                timezone = ?, theme = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(changes.username.unwrap_or(current.username))
    .bind(changes.email.unwrap_or(current.email))
    .bind(changes.first_name.unwrap_or(current.first_name))
    .bind(changes.last_name.unwrap_or(current.last_name))
    .bind(changes.avatar.unwrap_or(current.avatar))
    .bind(changes.timezone.unwrap_or(current.timezone))
    .bind(changes.theme.unwrap_or(current.theme))
    .bind(time::now())
    .bind(id)
    .execute(db)
    .await?;

    find_by_id(db, id).await
}

pub async fn set_password(db: &SqlitePool, id: &str, password_hash: &str) -> ApiResult<()> {
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(time::now())
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

/// Load the profile, creating the default one if it is missing
pub async fn profile(db: &SqlitePool, user_id: &str) -> ApiResult<ProfileRow> {
    sqlx::query("INSERT OR IGNORE INTO user_profiles (user_id) VALUES (?)")
        .bind(user_id)
        .execute(db)
        .await?;

    Ok(sqlx::query_as(
        "SELECT notification_enabled, email_notifications, push_notifications, language,
                working_hours_start, working_hours_end
         FROM user_profiles WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(db)
    .await?)
}

pub async fn update_profile(db: &SqlitePool, user_id: &str, changes: ProfileChanges) -> ApiResult<ProfileRow> {
    let current = profile(db, user_id).await?;
    sqlx::query(
        "UPDATE user_profiles SET notification_enabled = ?, email_notifications = ?,
                push_notifications = ?, language = ?, working_hours_start = ?, working_hours_end = ?
         WHERE user_id = ?",
    )
    .bind(changes.notification_enabled.unwrap_or(current.notification_enabled))
    .bind(changes.email_notifications.unwrap_or(current.email_notifications))
    .bind(changes.push_notifications.unwrap_or(current.push_notifications))
    .bind(changes.language.unwrap_or(current.language))
    .bind(changes.working_hours_start.unwrap_or(current.working_hours_start))
    .bind(changes.working_hours_end.unwrap_or(current.working_hours_end))
    .bind(user_id)
    .execute(db)
    .await?;

    profile(db, user_id).await
}

// ========================================
// Refresh token revocation
// ========================================

pub async fn revoke_token(db: &SqlitePool, jti: &str, user_id: &str, expires_at: DateTime<Utc>) -> ApiResult<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO revoked_tokens (jti, user_id, expires_at, revoked_at) VALUES (?, ?, ?, ?)",
    )
    .bind(jti)
    .bind(user_id)
    .bind(expires_at)
    .bind(time::now())
    .execute(db)
    .await?;
    Ok(())
}

pub async fn is_revoked(db: &SqlitePool, jti: &str) -> ApiResult<bool> {
    let found: Option<String> = sqlx::query_scalar("SELECT jti FROM revoked_tokens WHERE jti = ?")
        .bind(jti)
        .fetch_optional(db)
        .await?;
    Ok(found.is_some())
}

/// Remove revocations whose tokens have expired anyway
pub async fn purge_revoked(db: &SqlitePool) -> ApiResult<u64> {
    let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < ?")
        .bind(time::now())
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}
