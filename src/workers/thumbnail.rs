//! Fire-and-forget per-`MarkReady` frame extraction. Not a standing worker:
//! one task per call, spawned from `video_core::mark_ready`. All failures
//! are logged and swallowed — a video is fully functional without a
//! thumbnail.

use crate::state::AppState;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::process::Command;
use uuid::Uuid;

const EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

pub fn spawn(state: AppState, video_id: Uuid) {
    tokio::spawn(async move {
        if let Err(err) = run(&state, video_id).await {
            tracing::warn!(?err, %video_id, "thumbnail extraction failed");
        }
    });
}

async fn run(state: &AppState, video_id: Uuid) -> Result<()> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT object_key, share_token FROM videos WHERE id = $1")
            .bind(video_id)
            .fetch_optional(&state.db)
            .await
            .context("load video for thumbnail")?;
    let Some((object_key, share_token)) = row else {
        return Ok(());
    };

    let ext = object_key.rsplit('.').next().unwrap_or("mp4");
    let tmp_dir = std::env::temp_dir();
    let input_path = tmp_dir.join(format!("{video_id}-thumb-in.{ext}"));
    let output_path = tmp_dir.join(format!("{video_id}-thumb-out.jpg"));

    let cleanup = |paths: Vec<std::path::PathBuf>| async move {
        for path in paths {
            let _ = tokio::fs::remove_file(&path).await;
        }
    };

    state
        .objects
        .download_to_file(&object_key, &input_path)
        .await
        .context("download source for thumbnail")?;

    let extract = async {
        let output = Command::new("ffmpeg")
            .arg("-y")
            .arg("-ss")
            .arg("2")
            .arg("-i")
            .arg(&input_path)
            .arg("-frames:v")
            .arg("1")
            .arg("-vf")
            .arg("scale=640:360:force_original_aspect_ratio=decrease,pad=640:360:(ow-iw)/2:(oh-ih)/2")
            .arg(&output_path)
            .output()
            .await
            .context("spawn ffmpeg for thumbnail")?;
        if !output.status.success() {
            anyhow::bail!(
                "ffmpeg thumbnail exited with status {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok::<_, anyhow::Error>(())
    };

    if tokio::time::timeout(EXTRACT_TIMEOUT, extract).await.is_err() {
        cleanup(vec![input_path, output_path]).await;
        anyhow::bail!("ffmpeg thumbnail extraction timed out");
    }

    let thumbnail_key = format!(
        "recordings/{}/{}.jpg",
        object_key.split('/').nth(1).unwrap_or("unknown"),
        share_token
    );
    let upload_result = state
        .objects
        .upload_file(&thumbnail_key, &output_path, "image/jpeg")
        .await;
    cleanup(vec![input_path, output_path]).await;
    upload_result.context("upload thumbnail")?;

    sqlx::query("UPDATE videos SET thumbnail_key = $1, updated_at = now() WHERE id = $2")
        .bind(&thumbnail_key)
        .bind(video_id)
        .execute(&state.db)
        .await
        .context("persist thumbnail key")?;

    Ok(())
}
