use serde::{Deserialize, Serialize};

use super::{DocumentId, Timestamp, UserProfile};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: DocumentId,
    pub post_id: DocumentId,
    pub author_id: DocumentId,
    pub content: String,
    pub likes_count: i64,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentWithAuthor {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Option<UserProfile>,
}

/// Body of a comment submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewComment {
    pub author_id: DocumentId,
    pub content: String,
}
