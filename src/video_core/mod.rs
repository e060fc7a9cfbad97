pub mod comments;
pub mod trim;
pub mod views;

use crate::auth::AuthContext;
use crate::error::AppError;
use crate::models::video::{Video, VideoListItem, VideoStatus};
use crate::state::AppState;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;
use uuid::Uuid;

const SHARE_EXPIRY_DAYS: i64 = 7;
const SHARE_TOKEN_INSERT_RETRIES: u32 = 5;
const UPLOAD_PRESIGN_TTL: StdDuration = StdDuration::from_secs(15 * 60);
const THUMBNAIL_PRESIGN_TTL: StdDuration = StdDuration::from_secs(60 * 60);

#[derive(Debug, Deserialize)]
pub struct CreateVideoRequest {
    pub title: String,
    pub duration_seconds: i32,
    pub content_size_bytes: i64,
    pub content_type: String,
}

#[derive(Debug, Serialize)]
pub struct CreateVideoResponse {
    pub id: Uuid,
    pub upload_url: String,
    pub share_token: String,
    pub share_url: String,
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => "mp4",
    }
}

/// Per-user monthly cap (0 = unlimited) and per-clip duration cap (0 =
/// unlimited), plus presigned-upload issuance.
pub async fn create(
    state: &AppState,
    auth: &AuthContext,
    req: CreateVideoRequest,
) -> Result<CreateVideoResponse, AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::BadRequest("title must not be empty".to_string()));
    }

    let max_per_month = state.config.max_videos_per_month;
    if max_per_month > 0 {
        let count: (i64,) = sqlx::query_as(
            "SELECT count(*) FROM videos WHERE user_id = $1 AND created_at >= date_trunc('month', now())",
        )
        .bind(auth.user_id)
        .fetch_one(&state.db)
        .await?;
        if count.0 as u32 >= max_per_month {
            return Err(AppError::QuotaExceeded("monthly video quota exceeded".to_string()));
        }
    }

    let max_duration = state.config.max_video_duration_seconds;
    if max_duration > 0 && req.duration_seconds > max_duration as i32 {
        return Err(AppError::BadRequest("clip exceeds the configured duration limit".to_string()));
    }

    let ext = extension_for(&req.content_type);
    let video_id = Uuid::new_v4();
    let share_expires_at = Utc::now() + Duration::days(SHARE_EXPIRY_DAYS);

    let mut attempt = 0;
    let (share_token, object_key) = loop {
        let token = crate::auth::tokens::generate_share_token();
        let key = format!("recordings/{}/{}.{}", auth.user_id, token, ext);
        let conflict: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM videos WHERE share_token = $1")
                .bind(&token)
                .fetch_optional(&state.db)
                .await?;
        if conflict.is_none() {
            break (token, key);
        }
        attempt += 1;
        if attempt >= SHARE_TOKEN_INSERT_RETRIES {
            return Err(AppError::Internal(anyhow::anyhow!(
                "could not allocate a unique share token"
            )));
        }
    };

    let upload_url = state
        .objects
        .presign_upload(
            &object_key,
            &req.content_type,
            req.content_size_bytes.max(0) as u64,
            UPLOAD_PRESIGN_TTL,
        )
        .await?;

    sqlx::query(
        "INSERT INTO videos \
         (id, user_id, org_id, title, status, duration_seconds, object_key, \
          content_size_bytes, share_token, share_expires_at) \
         VALUES ($1, $2, $3, $4, 'uploading', $5, $6, $7, $8, $9)",
    )
    .bind(video_id)
    .bind(auth.user_id)
    .bind(auth.org_id)
    .bind(&req.title)
    .bind(req.duration_seconds)
    .bind(&object_key)
    .bind(req.content_size_bytes)
    .bind(&share_token)
    .bind(share_expires_at)
    .execute(&state.db)
    .await?;

    let share_url = format!("{}/watch/{}", state.config.base_url, share_token);

    Ok(CreateVideoResponse {
        id: video_id,
        upload_url,
        share_token,
        share_url,
    })
}

#[derive(Debug, Deserialize)]
pub struct ListVideosQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list(
    state: &AppState,
    auth: &AuthContext,
    query: ListVideosQuery,
) -> Result<Vec<VideoListItem>, AppError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);

    let videos: Vec<Video> = sqlx::query_as(
        "SELECT * FROM videos WHERE user_id = $1 AND status != 'deleted' \
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(auth.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    let mut items = Vec::with_capacity(videos.len());
    for video in videos {
        let view_count: (i64,) = sqlx::query_as("SELECT count(*) FROM views WHERE video_id = $1")
            .bind(video.id)
            .fetch_one(&state.db)
            .await?;
        let unique_view_count: (i64,) = sqlx::query_as(
            "SELECT count(DISTINCT viewer_hash) FROM views WHERE video_id = $1",
        )
        .bind(video.id)
        .fetch_one(&state.db)
        .await?;

        let thumbnail_url = match &video.thumbnail_key {
            Some(key) => Some(
                state
                    .objects
                    .presign_download(key, THUMBNAIL_PRESIGN_TTL, None)
                    .await?,
            ),
            None => None,
        };

        items.push(VideoListItem {
            id: video.id,
            title: video.title,
            status: video.status,
            duration_seconds: video.duration_seconds,
            share_token: video.share_token,
            share_expires_at: video.share_expires_at,
            comment_mode: video.comment_mode,
            thumbnail_url,
            view_count: view_count.0,
            unique_view_count: unique_view_count.0,
            created_at: video.created_at,
        });
    }

    Ok(items)
}

async fn load_owned(state: &AppState, auth: &AuthContext, id: Uuid) -> Result<Video, AppError> {
    let video: Option<Video> = sqlx::query_as("SELECT * FROM videos WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth.user_id)
        .fetch_optional(&state.db)
        .await?;
    video.ok_or(AppError::NotFound("video not found"))
}

/// The only legal transition into `ready`. On integrity success, spawns the
/// thumbnail task and leaves the row eligible for `TranscriptionWorker`.
pub async fn mark_ready(state: &AppState, auth: &AuthContext, id: Uuid) -> Result<(), AppError> {
    let video = load_owned(state, auth, id).await?;
    if video.status() != VideoStatus::Uploading {
        return Err(AppError::Conflict("video is not awaiting upload".to_string()));
    }

    let head = state.objects.head(&video.object_key).await.map_err(|_| {
        AppError::Conflict("uploaded object failed the integrity check".to_string())
    })?;

    if video.content_size_bytes > 0 && head.content_length != video.content_size_bytes as u64 {
        return Err(AppError::Conflict(
            "uploaded object failed the integrity check".to_string(),
        ));
    }

    let duration_seconds = normalize_duration(video.duration_seconds);

    let updated = sqlx::query(
        "UPDATE videos SET status = 'ready', duration_seconds = $1, content_size_bytes = $2, \
         updated_at = now() WHERE id = $3 AND status = 'uploading'",
    )
    .bind(duration_seconds)
    .bind(head.content_length as i64)
    .bind(id)
    .execute(&state.db)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::Conflict("video is not awaiting upload".to_string()));
    }

    crate::workers::thumbnail::spawn(state.clone(), id);

    Ok(())
}

/// Duration must never reach clients as `Infinity`/NaN — normalized against
/// the probed object at `MarkReady` time. See DESIGN.md for the decision.
fn normalize_duration(duration_seconds: i32) -> i32 {
    if duration_seconds.is_negative() || duration_seconds > 24 * 60 * 60 {
        0
    } else {
        duration_seconds
    }
}

pub async fn extend(state: &AppState, auth: &AuthContext, id: Uuid) -> Result<(), AppError> {
    let share_expires_at = Utc::now() + Duration::days(SHARE_EXPIRY_DAYS);
    let updated = sqlx::query(
        "UPDATE videos SET share_expires_at = $1, updated_at = now() WHERE id = $2 AND user_id = $3",
    )
    .bind(share_expires_at)
    .bind(id)
    .bind(auth.user_id)
    .execute(&state.db)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("video not found"));
    }
    Ok(())
}

pub async fn delete(state: &AppState, auth: &AuthContext, id: Uuid) -> Result<(), AppError> {
    let updated = sqlx::query(
        "UPDATE videos SET status = 'deleted', updated_at = now() WHERE id = $1 AND user_id = $2 AND status != 'deleted'",
    )
    .bind(id)
    .bind(auth.user_id)
    .execute(&state.db)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("video not found"));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct WatchResponse {
    pub id: Uuid,
    pub title: String,
    pub duration_seconds: i32,
    pub requires_password: bool,
    pub download_url: String,
    pub comment_mode: String,
}

pub async fn fetch_for_watch(state: &AppState, share_token: &str) -> Result<Video, AppError> {
    let video: Option<Video> = sqlx::query_as("SELECT * FROM videos WHERE share_token = $1")
        .bind(share_token)
        .fetch_optional(&state.db)
        .await?;
    let video = video.ok_or(AppError::NotFound("video not found"))?;
    if video.status() == VideoStatus::Deleted {
        return Err(AppError::NotFound("video not found"));
    }
    if video.is_expired() {
        return Err(AppError::Gone("link expired"));
    }
    Ok(video)
}

pub async fn watch(state: &AppState, video: &Video) -> Result<WatchResponse, AppError> {
    let download_url = state
        .objects
        .presign_download(&video.object_key, StdDuration::from_secs(15 * 60), None)
        .await?;
    Ok(WatchResponse {
        id: video.id,
        title: video.title.clone(),
        duration_seconds: video.duration_seconds,
        requires_password: video.password_hash.is_some(),
        download_url,
        comment_mode: video.comment_mode.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_out_of_range_durations() {
        assert_eq!(normalize_duration(-1), 0);
        assert_eq!(normalize_duration(100_000), 0);
        assert_eq!(normalize_duration(120), 120);
    }
}
