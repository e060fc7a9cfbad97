pub mod comment;
pub mod organization;
pub mod transcript;
pub mod user;
pub mod video;

pub use comment::Comment;
pub use organization::{OrgMembership, OrgRole};
pub use transcript::TranscriptSegment;
pub use user::User;
pub use video::{CommentMode, Video, VideoStatus};
