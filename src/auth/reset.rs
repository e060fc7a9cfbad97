use crate::auth::{password, tokens};
use crate::email::EmailSender;
use crate::error::AppError;
use crate::models::user::{PasswordReset, User};
use crate::state::AppState;
use chrono::{Duration, Utc};

const RESET_TOKEN_TTL_HOURS: i64 = 1;

/// Always succeeds from the caller's point of view — no-enumeration is
/// enforced by the handler returning the same response regardless of what
/// this returns `Ok(())` for. Only logs/dispatches mail when the address
/// resolves to a real user.
pub async fn request_password_reset(state: &AppState, email: &str) -> Result<(), AppError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE lower(email) = lower($1)")
        .bind(email)
        .fetch_optional(&state.db)
        .await?;
    let Some(user) = user else {
        return Ok(());
    };
    let user_id = user.id;

    sqlx::query("UPDATE password_resets SET used_at = now() WHERE user_id = $1 AND used_at IS NULL")
        .bind(user_id)
        .execute(&state.db)
        .await?;

    let raw = tokens::generate_opaque_token();
    let hash = tokens::hash_token(&raw);
    let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);

    sqlx::query(
        "INSERT INTO password_resets (token_hash, user_id, expires_at) VALUES ($1, $2, $3)",
    )
    .bind(&hash)
    .bind(user_id)
    .bind(expires_at)
    .execute(&state.db)
    .await?;

    let link = format!("{}/reset-password?token={}", state.config.base_url, raw);
    let body = format!("Reset your SendRec password: {link}\n\nThis link expires in 1 hour.");
    if let Err(err) = state.email.send(email, "Reset your password", &body).await {
        tracing::warn!(?err, "password reset email dispatch failed");
    }

    Ok(())
}

pub async fn reset_password(state: &AppState, raw_token: &str, new_password: &str) -> Result<(), AppError> {
    password::validate_password_length(new_password)?;
    let hash = tokens::hash_token(raw_token);

    let reset: Option<PasswordReset> =
        sqlx::query_as("SELECT * FROM password_resets WHERE token_hash = $1")
            .bind(&hash)
            .fetch_optional(&state.db)
            .await?;

    let Some(reset) = reset else {
        return Err(AppError::BadRequest("invalid or expired reset link".to_string()));
    };
    if !reset.is_usable() {
        return Err(AppError::BadRequest("invalid or expired reset link".to_string()));
    }
    let user_id = reset.user_id;

    let new_hash = password::hash(new_password)?;

    let mut tx = state.db.begin().await.map_err(AppError::from)?;
    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(&new_hash)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE password_resets SET used_at = now() WHERE token_hash = $1")
        .bind(&hash)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE refresh_tokens SET revoked = true, revoked_at = now() WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await.map_err(AppError::from)?;

    Ok(())
}
