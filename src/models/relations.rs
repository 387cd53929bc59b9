// Join entities. Presence of a record is the relationship; the counters on
// users and posts are caches of how many records exist.

use serde::{Deserialize, Serialize};

use super::{DocumentId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub post_id: DocumentId,
    pub user_id: DocumentId,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Follow {
    pub follower_id: DocumentId,
    pub following_id: DocumentId,
    pub created_at: Timestamp,
}

/// Outcome of a like toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeState {
    Liked,
    Unliked,
}

impl LikeState {
    pub fn is_liked(self) -> bool {
        matches!(self, LikeState::Liked)
    }
}

/// Outcome of a follow toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowState {
    Following,
    NotFollowing,
}

impl FollowState {
    pub fn is_following(self) -> bool {
        matches!(self, FollowState::Following)
    }
}
