//! Daily per-user rollup of views and comments, batched into one email per
//! user per day. Idempotent for a given (user, date) via `digest_log`.

use crate::state::AppState;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const RUN_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub fn spawn(state: AppState, shutdown: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(RUN_INTERVAL) => {}
                _ = shutdown.cancelled() => break,
            }
            if let Err(err) = run_once(&state).await {
                tracing::warn!(?err, "digest run failed");
            }
        }
    });
}

struct Rollup {
    user_id: Uuid,
    email: String,
    display_name: String,
    view_count: i64,
    comment_count: i64,
}

async fn run_once(state: &AppState) -> Result<()> {
    let today = Utc::now().date_naive();

    let candidates: Vec<Rollup> = sqlx::query_as::<_, (Uuid, String, String, i64, i64)>(
        "SELECT u.id, u.email, u.display_name, \
                (SELECT count(*) FROM views v JOIN videos vd ON vd.id = v.video_id \
                 WHERE vd.user_id = u.id AND v.created_at >= now() - interval '1 day'), \
                (SELECT count(*) FROM comments c JOIN videos vd ON vd.id = c.video_id \
                 WHERE vd.user_id = u.id AND c.created_at >= now() - interval '1 day') \
         FROM users u WHERE u.digest_opt_in = true",
    )
    .fetch_all(&state.db)
    .await
    .context("load digest candidates")?
    .into_iter()
    .map(|(user_id, email, display_name, view_count, comment_count)| Rollup {
        user_id,
        email,
        display_name,
        view_count,
        comment_count,
    })
    .collect();

    for rollup in candidates {
        if rollup.view_count == 0 && rollup.comment_count == 0 {
            continue;
        }
        if already_sent(state, rollup.user_id, today).await? {
            continue;
        }
        send_and_record(state, &rollup, today).await?;
    }
    Ok(())
}

async fn already_sent(state: &AppState, user_id: Uuid, date: NaiveDate) -> Result<bool> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("SELECT user_id FROM digest_log WHERE user_id = $1 AND digest_date = $2")
            .bind(user_id)
            .bind(date)
            .fetch_optional(&state.db)
            .await
            .context("check digest_log")?;
    Ok(row.is_some())
}

async fn send_and_record(state: &AppState, rollup: &Rollup, date: NaiveDate) -> Result<()> {
    let body = format!(
        "Hi {}, in the last day your videos received {} view(s) and {} comment(s).",
        rollup.display_name, rollup.view_count, rollup.comment_count
    );
    if let Err(err) = state
        .email
        .send(&rollup.email, "Your SendRec activity digest", &body)
        .await
    {
        tracing::warn!(?err, user_id = %rollup.user_id, "digest email dispatch failed");
        return Ok(());
    }

    sqlx::query("INSERT INTO digest_log (user_id, digest_date) VALUES ($1, $2) ON CONFLICT DO NOTHING")
        .bind(rollup.user_id)
        .bind(date)
        .execute(&state.db)
        .await
        .context("record digest_log")?;
    Ok(())
}
