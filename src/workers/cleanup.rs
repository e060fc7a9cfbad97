//! Two purge paths share one retrying delete routine: `purge_one` is the
//! fire-and-forget task spawned by `VideoCore::Delete`, and the periodic
//! sweep below is the safety net that catches anything `purge_one` missed
//! (a crashed process, a retry budget exhausted) for rows where
//! `file_purged_at` is still null.

use crate::state::AppState;
use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);
const BATCH_SIZE: i64 = 50;
const MAX_RETRIES: u32 = 3;

pub fn spawn(state: AppState, shutdown: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
                _ = shutdown.cancelled() => break,
            }
            if let Err(err) = sweep(&state).await {
                tracing::warn!(?err, "cleanup sweep failed");
            }
        }
    });
}

async fn sweep(state: &AppState) -> Result<()> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM videos WHERE status = 'deleted' AND file_purged_at IS NULL LIMIT $1",
    )
    .bind(BATCH_SIZE)
    .fetch_all(&state.db)
    .await?;

    for (id,) in rows {
        purge(state, id).await;
    }
    Ok(())
}

/// Spawned from `VideoCore::Delete` immediately after the status flip.
pub fn purge_one(state: AppState, video_id: Uuid) {
    tokio::spawn(async move {
        purge(&state, video_id).await;
    });
}

async fn purge(state: &AppState, video_id: Uuid) {
    let row: Option<(String, Option<String>)> =
        match sqlx::query_as("SELECT object_key, thumbnail_key FROM videos WHERE id = $1")
            .bind(video_id)
            .fetch_optional(&state.db)
            .await
        {
            Ok(row) => row,
            Err(err) => {
                tracing::warn!(?err, %video_id, "cleanup: failed to load video");
                return;
            }
        };
    let Some((object_key, thumbnail_key)) = row else {
        return;
    };

    let object_ok = delete_with_retries(state, &object_key).await;
    let thumb_ok = match &thumbnail_key {
        Some(key) => delete_with_retries(state, key).await,
        None => true,
    };

    if !object_ok || !thumb_ok {
        tracing::warn!(%video_id, "cleanup: will retry on next sweep");
        return;
    }

    if let Err(err) = sqlx::query("UPDATE videos SET file_purged_at = now() WHERE id = $1")
        .bind(video_id)
        .execute(&state.db)
        .await
    {
        tracing::warn!(?err, %video_id, "cleanup: failed to record purge");
    }
}

async fn delete_with_retries(state: &AppState, key: &str) -> bool {
    let mut delay = Duration::from_millis(200);
    for attempt in 0..MAX_RETRIES {
        match state.objects.delete(key).await {
            Ok(()) => return true,
            Err(err) => {
                tracing::warn!(?err, key, attempt, "object delete attempt failed");
                if attempt + 1 < MAX_RETRIES {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    false
}
