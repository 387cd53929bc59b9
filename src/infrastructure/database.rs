// Database Interface - document-store primitives used by the relationship store
// Every write takes the caller's transaction so a record and the counters it
// drives always commit together.

use async_trait::async_trait;
use sqlx::{Sqlite, Transaction};
use std::collections::HashSet;

use crate::error::{AppError, AppResult};
use crate::models::{
    Collection, Comment, DocumentId, Follow, Like, Post, PostPatch, Timestamp, UserProfile,
    UserProfilePatch,
};

/// Transaction wrapper for database operations
pub struct DatabaseTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl DatabaseTransaction {
    pub fn new_sqlite(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    pub fn as_sqlite_mut(&mut self) -> &mut Transaction<'static, Sqlite> {
        &mut self.tx
    }

    /// Commit the transaction
    pub async fn commit(self) -> AppResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit transaction: {}", e)))
    }

    /// Rollback the transaction
    pub async fn rollback(self) -> AppResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to rollback transaction: {}", e)))
    }
}

/// A denormalized counter field on a user or post document, together with
/// the collection whose records it counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    UserPosts,
    UserComments,
    UserFollowers,
    UserFollowing,
    PostLikes,
    PostComments,
}

impl Counter {
    pub const ALL: [Counter; 6] = [
        Counter::UserPosts,
        Counter::UserComments,
        Counter::UserFollowers,
        Counter::UserFollowing,
        Counter::PostLikes,
        Counter::PostComments,
    ];

    /// Collection holding the counter
    pub fn owner(&self) -> Collection {
        match self {
            Counter::UserPosts
            | Counter::UserComments
            | Counter::UserFollowers
            | Counter::UserFollowing => Collection::Users,
            Counter::PostLikes | Counter::PostComments => Collection::Posts,
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            Counter::UserPosts => "posts_count",
            Counter::UserComments | Counter::PostComments => "comments_count",
            Counter::UserFollowers => "followers_count",
            Counter::UserFollowing => "following_count",
            Counter::PostLikes => "likes_count",
        }
    }

    /// Collection and foreign key of the records being counted
    pub fn source(&self) -> (Collection, &'static str) {
        match self {
            Counter::UserPosts => (Collection::Posts, "author_id"),
            Counter::UserComments => (Collection::Comments, "author_id"),
            Counter::UserFollowers => (Collection::Follows, "following_id"),
            Counter::UserFollowing => (Collection::Follows, "follower_id"),
            Counter::PostLikes => (Collection::Likes, "post_id"),
            Counter::PostComments => (Collection::Comments, "post_id"),
        }
    }
}

/// A counter whose stored value disagrees with the live record count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterDrift {
    pub counter: Counter,
    pub id: DocumentId,
    pub stored: i64,
    pub actual: i64,
}

/// Post list filter. Results are always newest first.
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub author_id: Option<DocumentId>,
}

impl PostQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_author(author_id: impl Into<DocumentId>) -> Self {
        Self {
            author_id: Some(author_id.into()),
        }
    }
}

/// Database interface trait for the community collections
#[async_trait]
pub trait DatabaseInterface: Send + Sync {
    // Lifecycle
    async fn begin_transaction(&self) -> AppResult<DatabaseTransaction>;
    async fn health_check(&self) -> AppResult<()>;
    async fn close(&self);

    // Document reads
    async fn get_user(&self, id: &str) -> AppResult<Option<UserProfile>>;
    async fn get_users(&self, ids: &[DocumentId]) -> AppResult<Vec<UserProfile>>;
    async fn get_post(&self, id: &str) -> AppResult<Option<Post>>;
    async fn query_posts(&self, query: PostQuery) -> AppResult<Vec<Post>>;
    async fn query_comments(&self, post_id: &str) -> AppResult<Vec<Comment>>;

    // Join record reads
    async fn like_exists(&self, post_id: &str, user_id: &str) -> AppResult<bool>;
    async fn liked_post_ids(
        &self,
        user_id: &str,
        post_ids: &[DocumentId],
    ) -> AppResult<HashSet<DocumentId>>;
    async fn follow_exists(&self, follower_id: &str, following_id: &str) -> AppResult<bool>;

    // Aggregates
    async fn count_documents(&self, collection: Collection) -> AppResult<u64>;
    async fn count_users_active_since(&self, since: Timestamp) -> AppResult<u64>;
    async fn sum_post_likes(&self) -> AppResult<u64>;

    // Transactional writes. Methods returning bool report whether a row changed.
    async fn insert_user_tx(&self, tx: &mut DatabaseTransaction, user: &UserProfile)
        -> AppResult<bool>;
    async fn update_user_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: &str,
        patch: &UserProfilePatch,
    ) -> AppResult<bool>;
    async fn touch_user_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: &str,
        at: Timestamp,
    ) -> AppResult<bool>;
    async fn insert_post_tx(&self, tx: &mut DatabaseTransaction, post: &Post) -> AppResult<()>;
    async fn update_post_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: &str,
        patch: &PostPatch,
        at: Timestamp,
    ) -> AppResult<bool>;
    async fn delete_post_tx(&self, tx: &mut DatabaseTransaction, id: &str)
        -> AppResult<Option<Post>>;
    async fn insert_comment_tx(&self, tx: &mut DatabaseTransaction, comment: &Comment)
        -> AppResult<()>;
    async fn delete_comment_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: &str,
    ) -> AppResult<Option<Comment>>;
    async fn delete_comments_for_post_tx(
        &self,
        tx: &mut DatabaseTransaction,
        post_id: &str,
    ) -> AppResult<Vec<Comment>>;
    async fn insert_like_tx(&self, tx: &mut DatabaseTransaction, like: &Like) -> AppResult<bool>;
    async fn delete_like_tx(
        &self,
        tx: &mut DatabaseTransaction,
        post_id: &str,
        user_id: &str,
    ) -> AppResult<bool>;
    async fn delete_likes_for_post_tx(
        &self,
        tx: &mut DatabaseTransaction,
        post_id: &str,
    ) -> AppResult<u64>;
    async fn insert_follow_tx(&self, tx: &mut DatabaseTransaction, follow: &Follow)
        -> AppResult<bool>;
    async fn delete_follow_tx(
        &self,
        tx: &mut DatabaseTransaction,
        follower_id: &str,
        following_id: &str,
    ) -> AppResult<bool>;

    /// Server-side increment of one counter field on one document.
    /// Returns false when the document does not exist.
    async fn adjust_counter_tx(
        &self,
        tx: &mut DatabaseTransaction,
        counter: Counter,
        id: &str,
        delta: i64,
    ) -> AppResult<bool>;

    // Reconciliation
    /// Record a reconciliation run. Being a write, it takes the database
    /// write lock, so callers issue it before scanning.
    async fn stamp_reconciliation_tx(
        &self,
        tx: &mut DatabaseTransaction,
        at: Timestamp,
    ) -> AppResult<()>;
    async fn last_reconciliation(&self) -> AppResult<Option<Timestamp>>;
    async fn find_counter_drift_tx(
        &self,
        tx: &mut DatabaseTransaction,
        counter: Counter,
    ) -> AppResult<Vec<CounterDrift>>;
    async fn set_counter_tx(
        &self,
        tx: &mut DatabaseTransaction,
        counter: Counter,
        id: &str,
        value: i64,
    ) -> AppResult<bool>;
}
