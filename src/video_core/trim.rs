//! Single-shot trim: stream-copy only, no re-encode, new object key, old
//! key deleted only after the new key and the row both land.

use crate::error::AppError;
use crate::models::video::{Video, VideoStatus};
use crate::state::AppState;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use uuid::Uuid;

const TRIM_TIMEOUT: Duration = Duration::from_secs(10 * 60);

pub async fn trim(
    state: &AppState,
    auth_user_id: Uuid,
    video_id: Uuid,
    start_seconds: f64,
    end_seconds: f64,
) -> Result<(), AppError> {
    if end_seconds <= start_seconds {
        return Err(AppError::BadRequest("end must be after start".to_string()));
    }

    let video: Option<Video> =
        sqlx::query_as("SELECT * FROM videos WHERE id = $1 AND user_id = $2")
            .bind(video_id)
            .bind(auth_user_id)
            .fetch_optional(&state.db)
            .await?;
    let video = video.ok_or(AppError::NotFound("video not found"))?;
    if video.status() != VideoStatus::Ready {
        return Err(AppError::Conflict("video is not ready".to_string()));
    }

    run_trim(state, &video, start_seconds, end_seconds)
        .await
        .map_err(AppError::Internal)
}

async fn run_trim(state: &AppState, video: &Video, start: f64, end: f64) -> Result<()> {
    let ext = video
        .object_key
        .rsplit('.')
        .next()
        .unwrap_or("mp4")
        .to_string();
    let tmp_dir = std::env::temp_dir();
    let input_path = tmp_dir.join(format!("{}-in.{}", video.id, ext));
    let output_path = tmp_dir.join(format!("{}-out.{}", video.id, ext));

    let cleanup = |paths: Vec<PathBuf>| async move {
        for path in paths {
            let _ = tokio::fs::remove_file(&path).await;
        }
    };

    state
        .objects
        .download_to_file(&video.object_key, &input_path)
        .await
        .context("download source object for trim")?;

    let run = async {
        let output = Command::new("ffmpeg")
            .arg("-y")
            .arg("-ss")
            .arg(format!("{start}"))
            .arg("-to")
            .arg(format!("{end}"))
            .arg("-i")
            .arg(&input_path)
            .arg("-c")
            .arg("copy")
            .arg(&output_path)
            .output()
            .await
            .context("spawn ffmpeg")?;
        if !output.status.success() {
            anyhow::bail!(
                "ffmpeg trim exited with status {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok::<_, anyhow::Error>(())
    };

    if tokio::time::timeout(TRIM_TIMEOUT, run).await.is_err() {
        cleanup(vec![input_path, output_path]).await;
        anyhow::bail!("ffmpeg trim timed out");
    }

    let new_key = format!(
        "recordings/{}/{}-trimmed-{}.{}",
        video.user_id,
        video.share_token,
        Uuid::new_v4(),
        ext
    );

    let upload_result = state
        .objects
        .upload_file(&new_key, &output_path, &format!("video/{ext}"))
        .await;
    cleanup(vec![input_path, output_path]).await;
    upload_result.context("upload trimmed object")?;

    let new_duration = (end - start).round() as i32;
    let old_key = video.object_key.clone();

    let update = sqlx::query(
        "UPDATE videos SET object_key = $1, duration_seconds = $2, updated_at = now() WHERE id = $3",
    )
    .bind(&new_key)
    .bind(new_duration)
    .bind(video.id)
    .execute(&state.db)
    .await;

    match update {
        Ok(_) => {
            if let Err(err) = state.objects.delete(&old_key).await {
                tracing::warn!(?err, key = %old_key, "failed to delete pre-trim object");
            }
            Ok(())
        }
        Err(err) => {
            if let Err(delete_err) = state.objects.delete(&new_key).await {
                tracing::warn!(?delete_err, key = %new_key, "failed to roll back trimmed upload");
            }
            Err(err.into())
        }
    }
}
