// Relationship Store - CRUD over users, posts, comments, likes and follows
// Each mutation writes its record and every counter it affects in one
// transaction, so counters cannot drift from the records they summarize.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::finish_transaction;
use crate::config::StoreConfig;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{
    Counter, DatabaseInterface, DatabaseTransaction, PostQuery, SqliteDatabase,
};
use crate::models::{
    current_time_millis, generate_document_id, require_text, Collection, Comment,
    CommentWithAuthor, CommunityStats, DocumentId, Follow, FollowState, Like, LikeState, NewPost,
    NewUser, Post, PostPatch, PostWithAuthor, Timestamp, UserProfile, UserProfilePatch,
};

#[derive(Clone)]
pub struct RelationshipStore {
    db: Arc<dyn DatabaseInterface>,
    config: StoreConfig,
}

impl RelationshipStore {
    pub fn new(db: Arc<dyn DatabaseInterface>, config: StoreConfig) -> Self {
        Self { db, config }
    }

    /// Store over a fresh in-memory database
    pub async fn open_in_memory(config: StoreConfig) -> AppResult<Self> {
        let db = SqliteDatabase::new_in_memory().await?;
        Ok(Self::new(Arc::new(db), config))
    }

    pub fn database(&self) -> Arc<dyn DatabaseInterface> {
        Arc::clone(&self.db)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub async fn health_check(&self) -> AppResult<()> {
        self.db.health_check().await
    }

    /// Release the underlying connections. The store must not be used afterwards.
    pub async fn close(&self) {
        self.db.close().await;
        info!("Relationship store closed");
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn create_user(&self, new_user: NewUser) -> AppResult<UserProfile> {
        new_user.validate()?;
        let profile = new_user.into_profile(current_time_millis());

        let mut tx = self.db.begin_transaction().await?;
        let result = match self.db.insert_user_tx(&mut tx, &profile).await {
            Ok(true) => Ok(profile),
            Ok(false) => Err(AppError::Conflict(format!(
                "User {} is already registered",
                profile.id
            ))),
            Err(e) => Err(e),
        };
        let profile = finish_transaction(tx, result).await?;
        info!("Created user {}", profile.id);
        Ok(profile)
    }

    pub async fn get_user(&self, id: &str) -> AppResult<Option<UserProfile>> {
        self.db.get_user(id).await
    }

    /// Merge the provided profile fields. Returns false if the user does not exist.
    pub async fn update_user_profile(&self, id: &str, patch: UserProfilePatch) -> AppResult<bool> {
        let patch = patch.normalized()?;
        let mut tx = self.db.begin_transaction().await?;
        let result = self.db.update_user_tx(&mut tx, id, &patch).await;
        let updated = finish_transaction(tx, result).await?;
        if !updated {
            debug!("Profile update for unknown user {} ignored", id);
        }
        Ok(updated)
    }

    /// Heartbeat feeding the "online now" statistic
    pub async fn update_user_last_active(&self, id: &str) -> AppResult<bool> {
        self.record_user_activity(id, current_time_millis()).await
    }

    pub async fn record_user_activity(&self, id: &str, at: Timestamp) -> AppResult<bool> {
        let mut tx = self.db.begin_transaction().await?;
        let result = self.db.touch_user_tx(&mut tx, id, at).await;
        finish_transaction(tx, result).await
    }

    // =========================================================================
    // Posts
    // =========================================================================

    pub async fn create_post(&self, author_id: &str, data: NewPost) -> AppResult<DocumentId> {
        let post = data.into_post(generate_document_id(), author_id.to_string(), current_time_millis())?;

        let mut tx = self.db.begin_transaction().await?;
        let result = self.create_post_tx(&mut tx, &post).await;
        finish_transaction(tx, result).await?;

        info!("User {} published post {}", author_id, post.id);
        Ok(post.id)
    }

    async fn create_post_tx(&self, tx: &mut DatabaseTransaction, post: &Post) -> AppResult<()> {
        if !self.db.adjust_counter_tx(tx, Counter::UserPosts, &post.author_id, 1).await? {
            return Err(AppError::NotFound(format!("User {} not found", post.author_id)));
        }
        self.db.insert_post_tx(tx, post).await
    }

    pub async fn get_post(&self, id: &str) -> AppResult<Option<PostWithAuthor>> {
        let Some(post) = self.db.get_post(id).await? else {
            return Ok(None);
        };
        let mut enriched = self.attach_authors(vec![post], None).await?;
        Ok(enriched.pop())
    }

    /// All posts, newest first
    pub async fn get_posts(&self) -> AppResult<Vec<PostWithAuthor>> {
        let posts = self.db.query_posts(PostQuery::all()).await?;
        self.attach_authors(posts, None).await
    }

    /// All posts, newest first, with `liked` set for the viewer
    pub async fn get_feed(&self, viewer_id: &str) -> AppResult<Vec<PostWithAuthor>> {
        let posts = self.db.query_posts(PostQuery::all()).await?;
        self.attach_authors(posts, Some(viewer_id)).await
    }

    pub async fn get_user_posts(&self, author_id: &str) -> AppResult<Vec<PostWithAuthor>> {
        let posts = self.db.query_posts(PostQuery::by_author(author_id)).await?;
        self.attach_authors(posts, None).await
    }

    /// Merge the provided post fields; counters are never touched.
    /// Returns false if the post does not exist.
    pub async fn update_post(&self, id: &str, patch: PostPatch) -> AppResult<bool> {
        let patch = patch.normalized()?;
        let mut tx = self.db.begin_transaction().await?;
        let result = self
            .db
            .update_post_tx(&mut tx, id, &patch, current_time_millis())
            .await;
        finish_transaction(tx, result).await
    }

    /// Remove a post together with its likes and comments, fixing the
    /// author's and commenters' counters. Returns false if the post does not exist.
    pub async fn delete_post(&self, id: &str) -> AppResult<bool> {
        let mut tx = self.db.begin_transaction().await?;
        let result = self.delete_post_tx(&mut tx, id).await;
        let deleted = finish_transaction(tx, result).await?;
        if deleted {
            info!("Deleted post {}", id);
        }
        Ok(deleted)
    }

    async fn delete_post_tx(&self, tx: &mut DatabaseTransaction, id: &str) -> AppResult<bool> {
        let Some(post) = self.db.delete_post_tx(tx, id).await? else {
            return Ok(false);
        };

        if !self.db.adjust_counter_tx(tx, Counter::UserPosts, &post.author_id, -1).await? {
            warn!("Author {} of deleted post {} no longer exists", post.author_id, id);
        }

        let likes = self.db.delete_likes_for_post_tx(tx, id).await?;
        let comments = self.db.delete_comments_for_post_tx(tx, id).await?;
        for comment in &comments {
            self.db
                .adjust_counter_tx(tx, Counter::UserComments, &comment.author_id, -1)
                .await?;
        }
        debug!(
            "Post {} cascade removed {} likes and {} comments",
            id,
            likes,
            comments.len()
        );
        Ok(true)
    }

    // =========================================================================
    // Comments
    // =========================================================================

    pub async fn create_comment(
        &self,
        post_id: &str,
        author_id: &str,
        content: &str,
    ) -> AppResult<DocumentId> {
        require_text("content", content)?;
        let comment = Comment {
            id: generate_document_id(),
            post_id: post_id.to_string(),
            author_id: author_id.to_string(),
            content: content.to_string(),
            likes_count: 0,
            created_at: current_time_millis(),
        };

        let mut tx = self.db.begin_transaction().await?;
        let result = self.create_comment_tx(&mut tx, &comment).await;
        finish_transaction(tx, result).await?;

        debug!("User {} commented {} on post {}", author_id, comment.id, post_id);
        Ok(comment.id)
    }

    async fn create_comment_tx(&self, tx: &mut DatabaseTransaction, comment: &Comment) -> AppResult<()> {
        if !self.db.adjust_counter_tx(tx, Counter::PostComments, &comment.post_id, 1).await? {
            return Err(AppError::NotFound(format!("Post {} not found", comment.post_id)));
        }
        if !self.db.adjust_counter_tx(tx, Counter::UserComments, &comment.author_id, 1).await? {
            return Err(AppError::NotFound(format!("User {} not found", comment.author_id)));
        }
        self.db.insert_comment_tx(tx, comment).await
    }

    /// Comments of a post, newest first
    pub async fn get_comments(&self, post_id: &str) -> AppResult<Vec<CommentWithAuthor>> {
        let comments = self.db.query_comments(post_id).await?;
        let authors = self
            .load_authors(comments.iter().map(|c| c.author_id.clone()))
            .await?;

        Ok(comments
            .into_iter()
            .map(|comment| CommentWithAuthor {
                author: authors.get(&comment.author_id).cloned(),
                comment,
            })
            .collect())
    }

    /// Returns false if the comment does not exist.
    pub async fn delete_comment(&self, id: &str) -> AppResult<bool> {
        let mut tx = self.db.begin_transaction().await?;
        let result = self.delete_comment_tx(&mut tx, id).await;
        finish_transaction(tx, result).await
    }

    async fn delete_comment_tx(&self, tx: &mut DatabaseTransaction, id: &str) -> AppResult<bool> {
        let Some(comment) = self.db.delete_comment_tx(tx, id).await? else {
            return Ok(false);
        };
        self.db
            .adjust_counter_tx(tx, Counter::PostComments, &comment.post_id, -1)
            .await?;
        self.db
            .adjust_counter_tx(tx, Counter::UserComments, &comment.author_id, -1)
            .await?;
        Ok(true)
    }

    // =========================================================================
    // Likes
    // =========================================================================

    /// Unlike if the pair exists, like otherwise
    pub async fn toggle_like(&self, post_id: &str, user_id: &str) -> AppResult<LikeState> {
        let mut tx = self.db.begin_transaction().await?;
        let result = self.toggle_like_tx(&mut tx, post_id, user_id).await;
        let state = finish_transaction(tx, result).await?;
        debug!("User {} {:?} post {}", user_id, state, post_id);
        Ok(state)
    }

    async fn toggle_like_tx(
        &self,
        tx: &mut DatabaseTransaction,
        post_id: &str,
        user_id: &str,
    ) -> AppResult<LikeState> {
        if self.db.delete_like_tx(tx, post_id, user_id).await? {
            self.db.adjust_counter_tx(tx, Counter::PostLikes, post_id, -1).await?;
            return Ok(LikeState::Unliked);
        }

        if !self.db.adjust_counter_tx(tx, Counter::PostLikes, post_id, 1).await? {
            return Err(AppError::NotFound(format!("Post {} not found", post_id)));
        }
        let like = Like {
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            created_at: current_time_millis(),
        };
        self.db.insert_like_tx(tx, &like).await?;
        Ok(LikeState::Liked)
    }

    pub async fn check_liked(&self, post_id: &str, user_id: &str) -> AppResult<bool> {
        self.db.like_exists(post_id, user_id).await
    }

    // =========================================================================
    // Follows
    // =========================================================================

    /// Returns false when the follow already existed.
    pub async fn follow_user(&self, follower_id: &str, following_id: &str) -> AppResult<bool> {
        validate_follow_pair(follower_id, following_id)?;
        let mut tx = self.db.begin_transaction().await?;
        let result = self.follow_tx(&mut tx, follower_id, following_id).await;
        finish_transaction(tx, result).await
    }

    /// Returns false when there was nothing to undo.
    pub async fn unfollow_user(&self, follower_id: &str, following_id: &str) -> AppResult<bool> {
        let mut tx = self.db.begin_transaction().await?;
        let result = self.unfollow_tx(&mut tx, follower_id, following_id).await;
        finish_transaction(tx, result).await
    }

    pub async fn toggle_follow(&self, follower_id: &str, following_id: &str) -> AppResult<FollowState> {
        validate_follow_pair(follower_id, following_id)?;
        let mut tx = self.db.begin_transaction().await?;
        let unfollowed = self.unfollow_tx(&mut tx, follower_id, following_id).await;
        let result = match unfollowed {
            Ok(true) => Ok(FollowState::NotFollowing),
            Ok(false) => self
                .follow_tx(&mut tx, follower_id, following_id)
                .await
                .map(|_| FollowState::Following),
            Err(e) => Err(e),
        };
        finish_transaction(tx, result).await
    }

    pub async fn is_following(&self, follower_id: &str, following_id: &str) -> AppResult<bool> {
        self.db.follow_exists(follower_id, following_id).await
    }

    async fn follow_tx(
        &self,
        tx: &mut DatabaseTransaction,
        follower_id: &str,
        following_id: &str,
    ) -> AppResult<bool> {
        let follow = Follow {
            follower_id: follower_id.to_string(),
            following_id: following_id.to_string(),
            created_at: current_time_millis(),
        };
        if !self.db.insert_follow_tx(tx, &follow).await? {
            return Ok(false);
        }
        if !self.db.adjust_counter_tx(tx, Counter::UserFollowing, follower_id, 1).await? {
            return Err(AppError::NotFound(format!("User {} not found", follower_id)));
        }
        if !self.db.adjust_counter_tx(tx, Counter::UserFollowers, following_id, 1).await? {
            return Err(AppError::NotFound(format!("User {} not found", following_id)));
        }
        info!("User {} now follows {}", follower_id, following_id);
        Ok(true)
    }

    async fn unfollow_tx(
        &self,
        tx: &mut DatabaseTransaction,
        follower_id: &str,
        following_id: &str,
    ) -> AppResult<bool> {
        if !self.db.delete_follow_tx(tx, follower_id, following_id).await? {
            return Ok(false);
        }
        self.db.adjust_counter_tx(tx, Counter::UserFollowing, follower_id, -1).await?;
        self.db.adjust_counter_tx(tx, Counter::UserFollowers, following_id, -1).await?;
        info!("User {} unfollowed {}", follower_id, following_id);
        Ok(true)
    }

    // =========================================================================
    // Stats
    // =========================================================================

    pub async fn get_community_stats(&self) -> AppResult<CommunityStats> {
        let window = i64::try_from(self.config.online_window().as_millis()).unwrap_or(i64::MAX);
        let since = current_time_millis().saturating_sub(window);

        let (total_members, total_posts, online_users, total_likes) = futures::try_join!(
            self.db.count_documents(Collection::Users),
            self.db.count_documents(Collection::Posts),
            self.db.count_users_active_since(since),
            self.db.sum_post_likes(),
        )?;

        Ok(CommunityStats {
            total_members,
            total_posts,
            online_users,
            total_likes,
        })
    }

    // =========================================================================
    // Enrichment
    // =========================================================================

    async fn load_authors(
        &self,
        ids: impl Iterator<Item = DocumentId>,
    ) -> AppResult<HashMap<DocumentId, UserProfile>> {
        let unique: HashSet<DocumentId> = ids.collect();
        let ids: Vec<DocumentId> = unique.into_iter().collect();
        let users = self.db.get_users(&ids).await?;
        Ok(users.into_iter().map(|user| (user.id.clone(), user)).collect())
    }

    async fn attach_authors(
        &self,
        posts: Vec<Post>,
        viewer_id: Option<&str>,
    ) -> AppResult<Vec<PostWithAuthor>> {
        let authors = self.load_authors(posts.iter().map(|p| p.author_id.clone())).await?;
        let liked = match viewer_id {
            Some(viewer) => {
                let post_ids: Vec<DocumentId> = posts.iter().map(|p| p.id.clone()).collect();
                self.db.liked_post_ids(viewer, &post_ids).await?
            }
            None => HashSet::new(),
        };

        Ok(posts
            .into_iter()
            .map(|post| PostWithAuthor {
                author: authors.get(&post.author_id).cloned(),
                liked: liked.contains(&post.id),
                post,
            })
            .collect())
    }
}

fn validate_follow_pair(follower_id: &str, following_id: &str) -> AppResult<()> {
    require_text("followerId", follower_id)?;
    require_text("followingId", following_id)?;
    if follower_id == following_id {
        return Err(AppError::Validation("Users cannot follow themselves".to_string()));
    }
    Ok(())
}
