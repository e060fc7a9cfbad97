//! `/api/watch/*`, `/watch/*`, `/embed/*` — the unauthenticated viewer
//! surface: JSON and HTML renditions of a shared video, the password gate,
//! and comments.

use crate::auth::password;
use crate::error::{AppError, HandlerResult};
use crate::render::{self, WatchPageContext};
use crate::security::CspNonce;
use crate::state::AppState;
use crate::video_core::{self, comments, views};
use axum::{
    Extension, Json,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use cookie::{Cookie, SameSite, time};
use serde::Deserialize;
use std::net::SocketAddr;

fn watch_cookie_name(share_token: &str) -> String {
    format!("{}{}", views::WATCH_COOKIE_PREFIX, share_token)
}

fn is_password_verified(jar: &CookieJar, state: &AppState, share_token: &str) -> bool {
    let Some(cookie) = jar.get(&watch_cookie_name(share_token)) else {
        return false;
    };
    let Some((expiry_str, signature)) = cookie.value().split_once('.') else {
        return false;
    };
    let Ok(expires_at_unix) = expiry_str.parse::<i64>() else {
        return false;
    };
    views::verify_watch_cookie(
        &state.config.jwt_secret,
        share_token,
        expires_at_unix,
        signature,
    )
}

async fn record_view_if_allowed(
    state: &AppState,
    headers: &HeaderMap,
    addr: SocketAddr,
    video_id: uuid::Uuid,
) {
    let hash = views::viewer_hash(headers, addr);
    views::record_view(state, video_id, hash);
}

pub async fn watch_json(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(share_token): Path<String>,
) -> HandlerResult<Json<video_core::WatchResponse>> {
    let video = video_core::fetch_for_watch(&state, &share_token).await?;

    if video.password_hash.is_some() && !is_password_verified(&jar, &state, &share_token) {
        return Err(AppError::Unauthenticated);
    }

    record_view_if_allowed(&state, &headers, addr, video.id).await;
    let resp = video_core::watch(&state, &video).await?;
    Ok(Json(resp))
}

#[derive(Debug, Deserialize)]
pub struct VerifyPasswordRequest {
    pub password: String,
}

pub async fn verify_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(share_token): Path<String>,
    Json(req): Json<VerifyPasswordRequest>,
) -> HandlerResult<(CookieJar, StatusCode)> {
    let video = video_core::fetch_for_watch(&state, &share_token).await?;
    let Some(hash) = &video.password_hash else {
        return Ok((jar, StatusCode::OK));
    };
    if !password::verify(&req.password, hash) {
        return Err(AppError::Unauthenticated);
    }

    let expires_at_unix = Utc::now().timestamp() + views::WATCH_COOKIE_TTL_SECS;
    let signature = views::sign_watch_cookie(&state.config.jwt_secret, &share_token, expires_at_unix);
    let cookie = Cookie::build((watch_cookie_name(&share_token), format!("{expires_at_unix}.{signature}")))
        .path("/")
        .http_only(true)
        .secure(state.config.is_https())
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(views::WATCH_COOKIE_TTL_SECS))
        .build();

    Ok((jar.add(cookie), StatusCode::OK))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(share_token): Path<String>,
) -> HandlerResult<Json<Vec<crate::models::comment::CommentPublic>>> {
    let video = video_core::fetch_for_watch(&state, &share_token).await?;
    let items = comments::list(&state, &video, None).await?;
    Ok(Json(items))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Path(share_token): Path<String>,
    Json(req): Json<comments::CreateCommentRequest>,
) -> HandlerResult<(StatusCode, Json<crate::models::comment::CommentPublic>)> {
    let video = video_core::fetch_for_watch(&state, &share_token).await?;
    let created = comments::create(&state, &video, None, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<crate::auth::AuthContext>,
    Path((share_token, comment_id)): Path<(String, uuid::Uuid)>,
) -> HandlerResult<StatusCode> {
    let video = video_core::fetch_for_watch(&state, &share_token).await?;
    comments::delete(&state, &video, comment_id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn watch_page_context(
    video: &crate::models::video::Video,
    download_url: String,
    password_verified: bool,
) -> WatchPageContext {
    WatchPageContext {
        title: video.title.clone(),
        share_token: video.share_token.clone(),
        requires_password: video.password_hash.is_some(),
        password_verified,
        download_url,
    }
}

async fn render_page(
    state: &AppState,
    nonce: &CspNonce,
    headers: &HeaderMap,
    addr: SocketAddr,
    jar: &CookieJar,
    share_token: &str,
    embed: bool,
) -> HandlerResult<Html<String>> {
    let video = video_core::fetch_for_watch(state, share_token).await?;

    let password_verified = is_password_verified(jar, state, share_token);
    let show_player = video.password_hash.is_none() || password_verified;

    let download_url = if show_player {
        video_core::watch(state, &video).await?.download_url
    } else {
        String::new()
    };

    if show_player {
        record_view_if_allowed(state, headers, addr, video.id).await;
    }

    let ctx = watch_page_context(&video, download_url, password_verified);
    let html = if embed {
        render::render_embed(&nonce.as_base64(), &ctx)
    } else {
        render::render_watch(&nonce.as_base64(), &ctx)
    }
    .map_err(AppError::Internal)?;

    Ok(Html(html))
}

/// §6's "404/410 expired HTML" for the HTML surface: a `NotFound`/`Gone`
/// from `fetch_for_watch` renders as a page instead of the JSON API's error
/// body. Every other error kind falls back to `AppError`'s own response.
fn render_page_error(err: AppError) -> Response {
    let (status, title, message) = match &err {
        AppError::NotFound(m) => (StatusCode::NOT_FOUND, "Not found", *m),
        AppError::Gone(m) => (StatusCode::GONE, "Link expired", *m),
        _ => return err.into_response(),
    };
    match render::render_watch_error(title, message) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(render_err) => AppError::Internal(render_err).into_response(),
    }
}

pub async fn watch_page(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    Extension(nonce): Extension<CspNonce>,
    Path(share_token): Path<String>,
) -> Response {
    match render_page(&state, &nonce, &headers, addr, &jar, &share_token, false).await {
        Ok(html) => html.into_response(),
        Err(err) => render_page_error(err),
    }
}

pub async fn embed_page(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    Extension(nonce): Extension<CspNonce>,
    Path(share_token): Path<String>,
) -> Response {
    match render_page(&state, &nonce, &headers, addr, &jar, &share_token, true).await {
        Ok(html) => html.into_response(),
        Err(err) => render_page_error(err),
    }
}
