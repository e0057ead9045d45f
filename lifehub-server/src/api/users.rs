//! Registration, login, token refresh and account settings

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveTime, TimeZone, Utc};
use lifehub_common::api::auth::TokenKind;
use lifehub_common::api::password::{hash_password, validate_password_strength, verify_password};
use lifehub_common::db::settings::get_setting_or;
use lifehub_common::models::Theme;
use lifehub_common::patch::deserialize_some;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::db::users::{self, NewUser, ProfileChanges, ProfileRow, UserChanges, UserRow};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, AuthUser};
use crate::validate;
use crate::AppState;

/// Login and registration, no token required
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/auth/profile", get(get_profile).put(update_profile).patch(update_profile))
        .route("/api/auth/details", get(me).put(update_details).patch(update_details))
        .route("/api/auth/change-password", post(change_password))
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserRow,
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub avatar: Option<Option<String>>,
    pub timezone: Option<String>,
    pub theme: Option<Theme>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub notification_enabled: Option<bool>,
    pub email_notifications: Option<bool>,
    pub push_notifications: Option<bool>,
    pub language: Option<String>,
    pub working_hours_start: Option<NaiveTime>,
    pub working_hours_end: Option<NaiveTime>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: UserRow,
    #[serde(flatten)]
    pub profile: ProfileRow,
}

fn username(value: &str) -> ApiResult<String> {
    let value = validate::required_text("username", value, 150)?;
    if !value.chars().all(|c| c.is_alphanumeric() || "@.+-_".contains(c)) {
        return Err(ApiError::field(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        ));
    }
    Ok(value)
}

fn new_password(field: &str, password: &str, confirm: &str) -> ApiResult<()> {
    validate_password_strength(password).map_err(|msg| ApiError::field(field, msg))?;
    if password != confirm {
        return Err(ApiError::validation("Passwords do not match"));
    }
    Ok(())
}

/// Argon2 is deliberately slow; keep it off the async workers
async fn hash(password: String) -> ApiResult<String> {
    let hashed = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;
    Ok(hashed)
}

async fn verify(password: String, hash: String) -> ApiResult<bool> {
    let ok = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;
    Ok(ok)
}

fn issue(state: &AppState, user: UserRow) -> ApiResult<AuthResponse> {
    let pair = state.tokens.issue_pair(&user.id)?;
    Ok(AuthResponse {
        user,
        access: pair.access,
        refresh: pair.refresh,
    })
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    if !get_setting_or(&state.db, "registration_open", true).await? {
        return Err(ApiError::Authorization("Registration is closed".to_string()));
    }

    let username = username(&req.username)?;
    let email = validate::email("email", &req.email)?;
    new_password("password", &req.password, &req.password_confirm)?;

    let user = users::create(
        &state.db,
        NewUser {
            username,
            email,
            password_hash: hash(req.password).await?,
        },
    )
    .await?;
    info!("Registered user {} ({})", user.username, user.id);

    Ok((StatusCode::CREATED, Json(issue(&state, user)?)))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }

    let Some(creds) = users::credentials_by_email(&state.db, &email).await? else {
        return Err(ApiError::validation("Invalid email or password"));
    };
    if !verify(req.password, creds.password_hash).await? {
        return Err(ApiError::validation("Invalid email or password"));
    }
    if !creds.is_active {
        return Err(ApiError::validation("Account is disabled"));
    }

    let user = users::find_by_id(&state.db, &creds.id).await?;
    Ok(Json(issue(&state, user)?))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> ApiResult<Json<Value>> {
    let claims = state
        .tokens
        .verify(&req.refresh, TokenKind::Refresh)
        .map_err(|_| ApiError::Authentication("Token is invalid or expired".to_string()))?;
    if users::is_revoked(&state.db, &claims.jti).await? {
        return Err(ApiError::Authentication("Token is blacklisted".to_string()));
    }
    let user = users::find_by_id(&state.db, &claims.sub)
        .await
        .map_err(|_| ApiError::Authentication("User not found".to_string()))?;
    if !user.is_active {
        return Err(ApiError::Authentication("User is inactive".to_string()));
    }

    let (access, _) = state.tokens.issue(&user.id, TokenKind::Access)?;
    Ok(Json(json!({ "access": access })))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> ApiResult<Json<Value>> {
    let claims = state
        .tokens
        .verify(&req.refresh, TokenKind::Refresh)
        .map_err(|_| ApiError::validation("Logout failed"))?;
    if claims.sub != user.id {
        return Err(ApiError::validation("Logout failed"));
    }

    let expires_at = Utc.timestamp_opt(claims.exp, 0).single().unwrap_or_else(Utc::now);
    users::revoke_token(&state.db, &claims.jti, &user.id, expires_at).await?;
    info!("User {} logged out", user.username);

    Ok(Json(json!({ "message": "Logged out" })))
}

/// GET /api/auth/me, GET /api/auth/details
pub async fn me(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<UserRow>> {
    Ok(Json(users::find_by_id(&state.db, &user.id).await?))
}

/// PUT|PATCH /api/auth/details
pub async fn update_details(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<UserUpdate>,
) -> ApiResult<Json<UserRow>> {
    let changes = UserChanges {
        username: req.username.as_deref().map(username).transpose()?,
        email: req.email.as_deref().map(|e| validate::email("email", e)).transpose()?,
        first_name: req
            .first_name
            .map(|v| validate::max_len("first_name", &v, 150).map(|_| v))
            .transpose()?,
        last_name: req
            .last_name
            .map(|v| validate::max_len("last_name", &v, 150).map(|_| v))
            .transpose()?,
        avatar: req.avatar,
        timezone: req
            .timezone
            .as_deref()
            .map(|v| validate::required_text("timezone", v, 50))
            .transpose()?,
        theme: req.theme,
    };

    let updated = users::update(&state.db, &user.id, changes).await?;
    state.cache.clear_user(&user.id).await;
    Ok(Json(updated))
}

/// GET /api/auth/profile
pub async fn get_profile(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<ProfileResponse>> {
    Ok(Json(ProfileResponse {
        user: users::find_by_id(&state.db, &user.id).await?,
        profile: users::profile(&state.db, &user.id).await?,
    }))
}

/// PUT|PATCH /api/auth/profile
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<ProfileUpdate>,
) -> ApiResult<Json<ProfileResponse>> {
    let language = req
        .language
        .as_deref()
        .map(|v| validate::required_text("language", v, 10))
        .transpose()?;

    let profile = users::update_profile(
        &state.db,
        &user.id,
        ProfileChanges {
            notification_enabled: req.notification_enabled,
            email_notifications: req.email_notifications,
            push_notifications: req.push_notifications,
            language,
            working_hours_start: req.working_hours_start,
            working_hours_end: req.working_hours_end,
        },
    )
    .await?;

    Ok(Json(ProfileResponse {
        user: users::find_by_id(&state.db, &user.id).await?,
        profile,
    }))
}

/// POST /api/auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> ApiResult<Json<Value>> {
    let current_hash = users::password_hash(&state.db, &user.id).await?;
    if !verify(req.current_password, current_hash).await? {
        return Err(ApiError::field("current_password", "Current password is incorrect"));
    }
    new_password("new_password", &req.new_password, &req.new_password_confirm)?;

    let hashed = hash(req.new_password).await?;
    users::set_password(&state.db, &user.id, &hashed).await?;
    info!("User {} changed password", user.username);

    Ok(Json(json!({ "message": "Password changed" })))
}
