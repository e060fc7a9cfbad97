use crate::error::AppError;
use crate::models::comment::{Comment, CommentPublic};
use crate::models::video::{CommentMode, Video};
use crate::state::AppState;
use serde::Deserialize;
use uuid::Uuid;

const MAX_BODY_LEN: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub body: String,
    pub private: Option<bool>,
    pub video_timestamp_seconds: Option<i32>,
}

fn is_valid_email(email: &str) -> bool {
    #[derive(Deserialize, validator::Validate)]
    struct EmailHolder {
        #[validate(email)]
        email: String,
    }
    let holder = EmailHolder { email: email.to_string() };
    validator::Validate::validate(&holder).is_ok()
}

pub async fn create(
    state: &AppState,
    video: &Video,
    author_user_id: Option<Uuid>,
    req: CreateCommentRequest,
) -> Result<CommentPublic, AppError> {
    if req.body.is_empty() || req.body.len() > MAX_BODY_LEN {
        return Err(AppError::BadRequest(format!(
            "comment body must be 1-{MAX_BODY_LEN} bytes"
        )));
    }

    let author_name = match video.comment_mode() {
        CommentMode::Disabled => return Err(AppError::Forbidden),
        CommentMode::Anonymous => req.author_name.unwrap_or_else(|| "Anonymous".to_string()),
        CommentMode::NameRequired => {
            let name = req.author_name.unwrap_or_default();
            if name.trim().is_empty() {
                return Err(AppError::BadRequest("name is required".to_string()));
            }
            name
        }
        CommentMode::NameEmailRequired => {
            let name = req.author_name.unwrap_or_default();
            if name.trim().is_empty() {
                return Err(AppError::BadRequest("name is required".to_string()));
            }
            let email = req.author_email.clone().unwrap_or_default();
            if !is_valid_email(&email) {
                return Err(AppError::BadRequest("a valid email is required".to_string()));
            }
            name
        }
    };

    let id = Uuid::new_v4();
    let comment: Comment = sqlx::query_as(
        "INSERT INTO comments \
         (id, video_id, author_user_id, author_name, author_email, body, private, video_timestamp_seconds) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
    )
    .bind(id)
    .bind(video.id)
    .bind(author_user_id)
    .bind(&author_name)
    .bind(&req.author_email)
    .bind(&req.body)
    .bind(req.private.unwrap_or(false))
    .bind(req.video_timestamp_seconds)
    .fetch_one(&state.db)
    .await?;

    Ok(comment.to_public(video.user_id))
}

pub async fn list(
    state: &AppState,
    video: &Video,
    viewer_user_id: Option<Uuid>,
) -> Result<Vec<CommentPublic>, AppError> {
    let comments: Vec<Comment> =
        sqlx::query_as("SELECT * FROM comments WHERE video_id = $1 ORDER BY created_at")
            .bind(video.id)
            .fetch_all(&state.db)
            .await?;

    let is_owner = viewer_user_id == Some(video.user_id);
    Ok(comments
        .into_iter()
        .filter(|c| !c.private || is_owner)
        .map(|c| c.to_public(video.user_id))
        .collect())
}

/// Deletion allowed by the video's owner, or by the comment's author if
/// they're authenticated.
pub async fn delete(
    state: &AppState,
    video: &Video,
    comment_id: Uuid,
    requester_user_id: Uuid,
) -> Result<(), AppError> {
    let comment: Option<Comment> = sqlx::query_as("SELECT * FROM comments WHERE id = $1 AND video_id = $2")
        .bind(comment_id)
        .bind(video.id)
        .fetch_optional(&state.db)
        .await?;
    let comment = comment.ok_or(AppError::NotFound("comment not found"))?;

    let allowed = requester_user_id == video.user_id || comment.author_user_id == Some(requester_user_id);
    if !allowed {
        return Err(AppError::Forbidden);
    }

    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment_id)
        .execute(&state.db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_email_shape() {
        assert!(is_valid_email("a@example.com"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email(""));
    }
}
