use crate::auth::{api_key, jwt, tokens::hash_token};
use crate::error::AppError;
use crate::models::organization::{OrgMembership, OrgRole};
use crate::models::user::ApiKey;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub org_id: Option<Uuid>,
    pub org_role: Option<String>,
}

/// Attempts API-key auth first (bearer value shaped like `sr_<hex>` whose
/// hash resolves to a row); on miss, falls back to JWT. Attaches the
/// resolved identity to the request extensions for handlers to pull out.
/// Missing/invalid credentials on a protected route return 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthenticated)?;

    let user_id = if api_key::looks_like_api_key(bearer) {
        resolve_api_key(&state, bearer).await?
    } else {
        jwt::validate_access_token(&state.config.jwt_secret, bearer)?.sub
    };

    let (org_id, org_role) = resolve_org_context(&state, &req, user_id).await?;

    req.extensions_mut().insert(AuthContext {
        user_id,
        org_id,
        org_role,
    });

    Ok(next.run(req).await)
}

async fn resolve_api_key(state: &AppState, raw: &str) -> Result<Uuid, AppError> {
    let hash = hash_token(raw);
    let key: Option<ApiKey> = sqlx::query_as("SELECT * FROM api_keys WHERE key_hash = $1")
        .bind(&hash)
        .fetch_optional(&state.db)
        .await?;
    let user_id = key.ok_or(AppError::Unauthenticated)?.user_id;

    let db = state.db.clone();
    let hash_for_touch = hash.clone();
    tokio::spawn(async move {
        let _ = sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE key_hash = $1")
            .bind(&hash_for_touch)
            .execute(&db)
            .await;
    });

    Ok(user_id)
}

async fn resolve_org_context(
    state: &AppState,
    req: &Request,
    user_id: Uuid,
) -> Result<(Option<Uuid>, Option<String>), AppError> {
    let Some(org_header) = req
        .headers()
        .get("x-organization-id")
        .and_then(|v| v.to_str().ok())
    else {
        return Ok((None, None));
    };
    let Ok(org_id) = org_header.parse::<Uuid>() else {
        return Ok((None, None));
    };
    let membership: Option<OrgMembership> =
        sqlx::query_as("SELECT * FROM org_memberships WHERE org_id = $1 AND user_id = $2")
            .bind(org_id)
            .bind(user_id)
            .fetch_optional(&state.db)
            .await?;
    match membership {
        Some(m) if m.role.parse::<OrgRole>().is_ok() => Ok((Some(m.org_id), Some(m.role))),
        _ => Err(AppError::Forbidden),
    }
}
