//! `/api/auth/*`. Registration, login, refresh rotation, logout, and the
//! no-enumeration password reset pair.

use crate::auth::{self, AuthContext, jwt, password, tokens};
use crate::error::{AppError, HandlerResult};
use crate::models::user::{ApiKey, RefreshToken, User};
use crate::state::AppState;
use axum::{Json, extract::State};
use axum_extra::extract::CookieJar;
use chrono::{Duration, Utc};
use cookie::{Cookie, SameSite, time};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

const REFRESH_TOKEN_TTL_DAYS: i64 = 7;
const REFRESH_COOKIE_NAME: &str = "sr_refresh";

fn refresh_cookie(state: &AppState, raw_token: &str, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE_NAME, raw_token.to_string()))
        .path("/api/auth")
        .http_only(true)
        .secure(state.config.is_https())
        .same_site(SameSite::Strict)
        .max_age(max_age)
        .build()
}

fn expired_refresh_cookie(state: &AppState) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE_NAME, ""))
        .path("/api/auth")
        .http_only(true)
        .secure(state.config.is_https())
        .same_site(SameSite::Strict)
        .max_age(time::Duration::ZERO)
        .build()
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> HandlerResult<(axum::http::StatusCode, Json<Value>)> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("a valid email is required".to_string()));
    }
    if req.display_name.trim().is_empty() {
        return Err(AppError::BadRequest("display name is required".to_string()));
    }
    let password_hash = password::hash(&req.password)?;

    let existing: Option<User> = sqlx::query_as("SELECT * FROM users WHERE lower(email) = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("email already in use".to_string()));
    }

    let user: User = sqlx::query_as(
        "INSERT INTO users (email, password_hash, display_name) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(&req.display_name)
    .fetch_one(&state.db)
    .await?;

    let body = format!(
        "Welcome to SendRec, {}! Your account is ready.",
        req.display_name
    );
    if let Err(err) = state.email.send(&email, "Welcome to SendRec", &body).await {
        tracing::warn!(?err, "registration confirmation email dispatch failed");
    }

    Ok((
        axum::http::StatusCode::CREATED,
        Json(json!({ "id": user.id, "email": user.email })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user_id: Uuid,
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> HandlerResult<(CookieJar, Json<LoginResponse>)> {
    let email = req.email.trim().to_lowercase();
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE lower(email) = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or(AppError::Unauthenticated)?;
    if !password::verify(&req.password, &user.password_hash) {
        return Err(AppError::Unauthenticated);
    }
    let user_id = user.id;

    let raw_refresh = tokens::generate_opaque_token();
    let refresh_hash = tokens::hash_token(&raw_refresh);
    let expires_at = Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS);
    sqlx::query(
        "INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3)",
    )
    .bind(user_id)
    .bind(&refresh_hash)
    .bind(expires_at)
    .execute(&state.db)
    .await?;

    let access_token = jwt::issue_access_token(&state.config.jwt_secret, user_id, None)?;
    let cookie = refresh_cookie(
        &state,
        &raw_refresh,
        time::Duration::days(REFRESH_TOKEN_TTL_DAYS),
    );

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            access_token,
            user_id,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

/// Validates the refresh cookie against its DB row, then rotates it: the
/// old row is revoked and a new one issued in the same request.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> HandlerResult<(CookieJar, Json<RefreshResponse>)> {
    let raw = jar
        .get(REFRESH_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .ok_or(AppError::Unauthenticated)?;
    let hash = tokens::hash_token(&raw);

    let token: Option<RefreshToken> =
        sqlx::query_as("SELECT * FROM refresh_tokens WHERE token_hash = $1")
            .bind(&hash)
            .fetch_optional(&state.db)
            .await?;
    let token = token.ok_or(AppError::Unauthenticated)?;
    if !token.is_valid() {
        return Err(AppError::Unauthenticated);
    }
    let user_id = token.user_id;

    let raw_new = tokens::generate_opaque_token();
    let hash_new = tokens::hash_token(&raw_new);
    let new_expires_at = Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS);

    let mut tx = state.db.begin().await.map_err(AppError::from)?;
    sqlx::query("UPDATE refresh_tokens SET revoked = true, revoked_at = now() WHERE id = $1")
        .bind(token.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(&hash_new)
        .bind(new_expires_at)
        .execute(&mut *tx)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    let access_token = jwt::issue_access_token(&state.config.jwt_secret, user_id, None)?;
    let cookie = refresh_cookie(
        &state,
        &raw_new,
        time::Duration::days(REFRESH_TOKEN_TTL_DAYS),
    );

    Ok((jar.add(cookie), Json(RefreshResponse { access_token })))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> HandlerResult<(CookieJar, axum::http::StatusCode)> {
    if let Some(raw) = jar.get(REFRESH_COOKIE_NAME).map(|c| c.value().to_string()) {
        let hash = tokens::hash_token(&raw);
        sqlx::query("UPDATE refresh_tokens SET revoked = true, revoked_at = now() WHERE token_hash = $1")
            .bind(&hash)
            .execute(&state.db)
            .await?;
    }
    Ok((
        jar.add(expired_refresh_cookie(&state)),
        axum::http::StatusCode::NO_CONTENT,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Always 200 with the same body, whether or not the email resolves to a
/// user — the no-enumeration contract in §4.3.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> HandlerResult<Json<Value>> {
    let email = req.email.trim();
    if email.is_empty() {
        return Err(AppError::BadRequest("email is required".to_string()));
    }
    auth::reset::request_password_reset(&state, &email.to_lowercase()).await?;
    Ok(Json(json!({
        "message": "If an account with that email exists, we've sent a password reset link"
    })))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> HandlerResult<Json<Value>> {
    auth::reset::reset_password(&state, &req.token, &req.password).await?;
    Ok(Json(json!({ "message": "password updated" })))
}

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
}

/// The raw key is returned exactly once, here, and never again.
pub async fn create_api_key(
    State(state): State<AppState>,
    auth: axum::Extension<AuthContext>,
    Json(req): Json<CreateApiKeyRequest>,
) -> HandlerResult<(axum::http::StatusCode, Json<ApiKeyResponse>)> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    let (raw, hash) = auth::api_key::generate();
    let key: ApiKey = sqlx::query_as(
        "INSERT INTO api_keys (key_hash, user_id, name) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(&hash)
    .bind(auth.user_id)
    .bind(&req.name)
    .fetch_one(&state.db)
    .await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(ApiKeyResponse {
            key: raw,
            name: key.name,
        }),
    ))
}
