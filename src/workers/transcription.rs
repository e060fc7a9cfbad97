//! Polls for `ready` videos awaiting transcription, claims one via a
//! row-level CAS, transcribes it with an external subprocess, and bulk
//! inserts the resulting segments in one transaction.

use crate::state::AppState;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const RECLAIM_AFTER_MINUTES: i64 = 15;
const MAX_ATTEMPTS: i32 = 3;
const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub fn spawn(state: AppState, shutdown: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = shutdown.cancelled() => break,
            }

            if !state.config.transcription_enabled {
                continue;
            }

            if let Err(err) = reclaim_abandoned(&state).await {
                tracing::warn!(?err, "reclaim abandoned transcription rows failed");
            }

            match claim_one(&state).await {
                Ok(Some(video_id)) => {
                    if let Err(err) = process(&state, video_id).await {
                        tracing::warn!(?err, %video_id, "transcription failed");
                        let _ = mark_failed(&state, video_id).await;
                    }
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(?err, "claim transcription candidate failed"),
            }
        }
    });
}

/// A row claimed but never finished (process restart mid-job) is eligible
/// for reclaim once its claim is older than the threshold.
async fn reclaim_abandoned(state: &AppState) -> Result<()> {
    sqlx::query(
        "UPDATE videos SET transcription_status = 'pending', transcription_claimed_at = NULL \
         WHERE transcription_status = 'in_progress' \
         AND transcription_claimed_at < now() - ($1 || ' minutes')::interval",
    )
    .bind(RECLAIM_AFTER_MINUTES.to_string())
    .execute(&state.db)
    .await
    .context("reclaim abandoned rows")?;
    Ok(())
}

async fn claim_one(state: &AppState) -> Result<Option<Uuid>> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        "UPDATE videos SET transcription_status = 'in_progress', transcription_claimed_at = now() \
         WHERE id = (\
             SELECT id FROM videos \
             WHERE status = 'ready' AND transcription_status = 'pending' \
             ORDER BY created_at LIMIT 1 FOR UPDATE SKIP LOCKED\
         ) RETURNING id",
    )
    .fetch_optional(&state.db)
    .await
    .context("claim candidate")?;
    Ok(row.map(|(id,)| id))
}

struct ParsedSegment {
    start_seconds: f64,
    end_seconds: f64,
    text: String,
}

/// `whisper-cli`'s JSON output is one object per segment; only the fields
/// this worker needs are parsed, everything else is ignored.
fn parse_segments(stdout: &str) -> Vec<ParsedSegment> {
    let parsed: serde_json::Value = match serde_json::from_str(stdout) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let Some(segments) = parsed.get("segments").and_then(|s| s.as_array()) else {
        return Vec::new();
    };
    segments
        .iter()
        .filter_map(|seg| {
            Some(ParsedSegment {
                start_seconds: seg.get("start")?.as_f64()?,
                end_seconds: seg.get("end")?.as_f64()?,
                text: seg.get("text")?.as_str()?.trim().to_string(),
            })
        })
        .collect()
}

async fn process(state: &AppState, video_id: Uuid) -> Result<()> {
    let row: Option<(String,)> = sqlx::query_as("SELECT object_key FROM videos WHERE id = $1")
        .bind(video_id)
        .fetch_optional(&state.db)
        .await
        .context("load video for transcription")?;
    let Some((object_key,)) = row else {
        return Ok(());
    };

    let ext = object_key.rsplit('.').next().unwrap_or("mp4");
    let input_path = std::env::temp_dir().join(format!("{video_id}-transcribe.{ext}"));
    state
        .objects
        .download_to_file(&object_key, &input_path)
        .await
        .context("download source for transcription")?;

    let run = async {
        Command::new("whisper-cli")
            .arg("--output-format")
            .arg("json")
            .arg(&input_path)
            .output()
            .await
            .context("spawn whisper-cli")
    };

    let output = match tokio::time::timeout(TRANSCRIBE_TIMEOUT, run).await {
        Ok(result) => result,
        Err(_) => {
            let _ = tokio::fs::remove_file(&input_path).await;
            anyhow::bail!("transcription subprocess timed out");
        }
    }?;
    let _ = tokio::fs::remove_file(&input_path).await;

    if !output.status.success() {
        anyhow::bail!(
            "whisper-cli exited with status {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let segments = parse_segments(&stdout);

    let mut tx = state.db.begin().await.context("begin transcript transaction")?;
    sqlx::query("DELETE FROM transcript_segments WHERE video_id = $1")
        .bind(video_id)
        .execute(&mut *tx)
        .await?;
    for (ordinal, seg) in segments.iter().enumerate() {
        sqlx::query(
            "INSERT INTO transcript_segments (video_id, start_seconds, end_seconds, text, ordinal) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(video_id)
        .bind(seg.start_seconds)
        .bind(seg.end_seconds)
        .bind(&seg.text)
        .bind(ordinal as i32)
        .execute(&mut *tx)
        .await?;
    }
    sqlx::query(
        "UPDATE videos SET transcription_status = 'done', transcription_claimed_at = NULL WHERE id = $1",
    )
    .bind(video_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await.context("commit transcript transaction")?;

    Ok(())
}

async fn mark_failed(state: &AppState, video_id: Uuid) -> Result<()> {
    let row: Option<(i32,)> =
        sqlx::query_as("SELECT transcription_attempts FROM videos WHERE id = $1")
            .bind(video_id)
            .fetch_optional(&state.db)
            .await?;
    let attempts = row.map(|(a,)| a).unwrap_or(0) + 1;
    let status = if attempts >= MAX_ATTEMPTS { "failed" } else { "pending" };
    sqlx::query(
        "UPDATE videos SET transcription_status = $1, transcription_attempts = $2, \
         transcription_claimed_at = NULL WHERE id = $3",
    )
    .bind(status)
    .bind(attempts)
    .bind(video_id)
    .execute(&state.db)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whisper_style_segments() {
        let stdout = r#"{"segments":[{"start":0.0,"end":1.5,"text":" Hello"},{"start":1.5,"end":3.0,"text":"world "}]}"#;
        let segments = parse_segments(stdout);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "Hello");
        assert_eq!(segments[1].start_seconds, 1.5);
    }

    #[test]
    fn tolerates_malformed_output() {
        assert!(parse_segments("not json").is_empty());
        assert!(parse_segments("{}").is_empty());
    }
}
