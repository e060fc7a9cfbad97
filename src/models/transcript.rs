use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TranscriptSegment {
    pub id: Uuid,
    pub video_id: Uuid,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
    pub ordinal: i32,
}
