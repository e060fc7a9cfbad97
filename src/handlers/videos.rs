//! `/api/videos/*` — authenticated CRUD plus the upload-confirmation and
//! extend-expiry operations.

use crate::auth::AuthContext;
use crate::error::{AppError, HandlerResult};
use crate::state::AppState;
use crate::video_core;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

pub async fn create_video(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<video_core::CreateVideoRequest>,
) -> HandlerResult<(StatusCode, Json<video_core::CreateVideoResponse>)> {
    let resp = video_core::create(&state, &auth, req).await?;
    Ok((StatusCode::OK, Json(resp)))
}

pub async fn list_videos(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<video_core::ListVideosQuery>,
) -> HandlerResult<Json<Vec<crate::models::video::VideoListItem>>> {
    let items = video_core::list(&state, &auth, query).await?;
    Ok(Json(items))
}

#[derive(Debug, serde::Deserialize)]
pub struct UpdateVideoRequest {
    pub status: Option<String>,
    pub title: Option<String>,
    pub comment_mode: Option<String>,
}

/// The only write path into `status = ready`: a PATCH whose `status` field
/// is `"ready"` drives `VideoCore::MarkReady`. Other fields are plain
/// owner-scoped updates.
pub async fn update_video(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateVideoRequest>,
) -> HandlerResult<StatusCode> {
    if let Some(status) = &req.status {
        if status == "ready" {
            video_core::mark_ready(&state, &auth, id).await?;
            return Ok(StatusCode::OK);
        }
        return Err(AppError::BadRequest(format!(
            "unsupported status transition: {status}"
        )));
    }

    if req.title.is_none() && req.comment_mode.is_none() {
        return Err(AppError::BadRequest("nothing to update".to_string()));
    }
    if let Some(mode) = &req.comment_mode {
        mode.parse::<crate::models::CommentMode>()
            .map_err(|_| AppError::BadRequest(format!("unknown comment mode: {mode}")))?;
    }

    let updated = sqlx::query(
        "UPDATE videos SET title = COALESCE($1, title), comment_mode = COALESCE($2, comment_mode), \
         updated_at = now() WHERE id = $3 AND user_id = $4",
    )
    .bind(&req.title)
    .bind(&req.comment_mode)
    .bind(id)
    .bind(auth.user_id)
    .execute(&state.db)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("video not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn extend_video(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> HandlerResult<StatusCode> {
    video_core::extend(&state, &auth, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_video(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> HandlerResult<StatusCode> {
    video_core::delete(&state, &auth, id).await?;
    crate::workers::cleanup::purge_one(state.clone(), id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, serde::Deserialize)]
pub struct TrimRequest {
    pub start_seconds: f64,
    pub end_seconds: f64,
}

pub async fn trim_video(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<TrimRequest>,
) -> HandlerResult<StatusCode> {
    video_core::trim::trim(&state, auth.user_id, id, req.start_seconds, req.end_seconds).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_transcript(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> HandlerResult<Json<Vec<crate::models::transcript::TranscriptSegment>>> {
    let owned: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM videos WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth.user_id)
        .fetch_optional(&state.db)
        .await?;
    owned.ok_or(AppError::NotFound("video not found"))?;

    let segments = sqlx::query_as(
        "SELECT * FROM transcript_segments WHERE video_id = $1 ORDER BY ordinal",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(segments))
}
