use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub video_id: Uuid,
    pub author_user_id: Option<Uuid>,
    pub author_name: String,
    pub author_email: Option<String>,
    pub body: String,
    pub private: bool,
    pub video_timestamp_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CommentPublic {
    pub id: Uuid,
    pub author_name: String,
    pub body: String,
    pub is_owner: bool,
    pub video_timestamp_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Owner-badge rendering is derived, never stored.
    pub fn to_public(&self, video_owner_id: Uuid) -> CommentPublic {
        CommentPublic {
            id: self.id,
            author_name: self.author_name.clone(),
            body: self.body.clone(),
            is_owner: self.author_user_id == Some(video_owner_id),
            video_timestamp_seconds: self.video_timestamp_seconds,
            created_at: self.created_at,
        }
    }
}
