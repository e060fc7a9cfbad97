use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Uploading,
    Ready,
    Deleted,
}

impl VideoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VideoStatus::Uploading => "uploading",
            VideoStatus::Ready => "ready",
            VideoStatus::Deleted => "deleted",
        }
    }
}

impl std::str::FromStr for VideoStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(VideoStatus::Uploading),
            "ready" => Ok(VideoStatus::Ready),
            "deleted" => Ok(VideoStatus::Deleted),
            other => anyhow::bail!("unknown video status {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentMode {
    Disabled,
    Anonymous,
    NameRequired,
    NameEmailRequired,
}

impl CommentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CommentMode::Disabled => "disabled",
            CommentMode::Anonymous => "anonymous",
            CommentMode::NameRequired => "name_required",
            CommentMode::NameEmailRequired => "name_email_required",
        }
    }
}

impl std::str::FromStr for CommentMode {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(CommentMode::Disabled),
            "anonymous" => Ok(CommentMode::Anonymous),
            "name_required" => Ok(CommentMode::NameRequired),
            "name_email_required" => Ok(CommentMode::NameEmailRequired),
            other => anyhow::bail!("unknown comment mode {other}"),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Video {
    pub id: Uuid,
    pub user_id: Uuid,
    pub org_id: Option<Uuid>,
    pub title: String,
    pub status: String,
    pub duration_seconds: i32,
    pub object_key: String,
    pub thumbnail_key: Option<String>,
    pub content_size_bytes: i64,
    pub share_token: String,
    pub share_expires_at: DateTime<Utc>,
    pub comment_mode: String,
    pub password_hash: Option<String>,
    pub transcription_status: String,
    pub transcription_attempts: i32,
    pub transcription_claimed_at: Option<DateTime<Utc>>,
    pub file_purged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    pub fn is_expired(&self) -> bool {
        self.share_expires_at < Utc::now()
    }

    pub fn status(&self) -> VideoStatus {
        self.status.parse().unwrap_or(VideoStatus::Deleted)
    }

    pub fn comment_mode(&self) -> CommentMode {
        self.comment_mode.parse().unwrap_or(CommentMode::Disabled)
    }
}

#[derive(Debug, Serialize)]
pub struct VideoListItem {
    pub id: Uuid,
    pub title: String,
    pub status: String,
    pub duration_seconds: i32,
    pub share_token: String,
    pub share_expires_at: DateTime<Utc>,
    pub comment_mode: String,
    pub thumbnail_url: Option<String>,
    pub view_count: i64,
    pub unique_view_count: i64,
    pub created_at: DateTime<Utc>,
}
