// Community data model - documents stored in the five collections

pub mod comment;
pub mod post;
pub mod relations;
pub mod stats;
pub mod user;

pub use comment::{Comment, CommentWithAuthor, NewComment};
pub use post::{NewPost, Post, PostPatch, PostWithAuthor};
pub use relations::{Follow, FollowState, Like, LikeState};
pub use stats::CommunityStats;
pub use user::{NewUser, UserProfile, UserProfilePatch};

/// Epoch milliseconds
pub type Timestamp = i64;

/// Document identifier. Users carry the identity provider's id, everything
/// else gets a generated UUID.
pub type DocumentId = String;

pub fn current_time_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

pub fn generate_document_id() -> DocumentId {
    uuid::Uuid::new_v4().simple().to_string()
}

/// The collections the store manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users,
    Posts,
    Comments,
    Likes,
    Follows,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Posts => "posts",
            Collection::Comments => "comments",
            Collection::Likes => "likes",
            Collection::Follows => "follows",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trims every entry and drops the blank ones, keeping order.
pub(crate) fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

pub(crate) fn require_text(field: &str, value: &str) -> crate::error::AppResult<()> {
    if value.trim().is_empty() {
        return Err(crate::error::AppError::Validation(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(())
}
