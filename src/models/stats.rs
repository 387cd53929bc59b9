use serde::{Deserialize, Serialize};

/// Community-wide aggregates shown on the landing page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityStats {
    pub total_members: u64,
    pub total_posts: u64,
    pub online_users: u64,
    pub total_likes: u64,
}
