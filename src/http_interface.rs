// HTTP Interface - JSON endpoints over the relationship store

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    models::{
        CommentWithAuthor, CommunityStats, DocumentId, NewComment, NewPost, NewUser, PostPatch,
        PostWithAuthor, UserProfile, UserProfilePatch,
    },
    services::ReconciliationReport,
};

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub viewer: Option<DocumentId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreatePostRequest {
    pub author_id: DocumentId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl CreatePostRequest {
    fn into_parts(self) -> (DocumentId, NewPost) {
        let post = NewPost {
            title: self.title,
            content: self.content,
            tags: self.tags,
            image_url: self.image_url,
        };
        (self.author_id, post)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LikeRequest {
    pub user_id: DocumentId,
}

fn found<T>(value: Option<T>, what: &str, id: &str) -> AppResult<Json<T>> {
    value
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("{} {} not found", what, id)))
}

fn changed(done: bool, key: &str, what: &str, id: &str) -> AppResult<Json<Value>> {
    if done {
        let mut body = serde_json::Map::new();
        body.insert(key.to_string(), Value::Bool(true));
        Ok(Json(Value::Object(body)))
    } else {
        Err(AppError::NotFound(format!("{} {} not found", what, id)))
    }
}

// =========================================================================
// Handlers
// =========================================================================

pub async fn health_handler(State(state): State<AppState>) -> AppResult<Json<Value>> {
    state.store.health_check().await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn create_user_handler(
    State(state): State<AppState>,
    Json(req): Json<NewUser>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    let profile = state.store.create_user(req).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn get_user_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<UserProfile>> {
    found(state.store.get_user(&id).await?, "User", &id)
}

pub async fn update_user_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<UserProfilePatch>,
) -> AppResult<Json<Value>> {
    let updated = state.store.update_user_profile(&id, patch).await?;
    changed(updated, "updated", "User", &id)
}

pub async fn heartbeat_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let updated = state.store.update_user_last_active(&id).await?;
    changed(updated, "updated", "User", &id)
}

pub async fn get_user_posts_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<PostWithAuthor>>> {
    Ok(Json(state.store.get_user_posts(&id).await?))
}

pub async fn is_following_handler(
    State(state): State<AppState>,
    Path((id, target)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let following = state.store.is_following(&id, &target).await?;
    Ok(Json(json!({ "following": following })))
}

pub async fn follow_handler(
    State(state): State<AppState>,
    Path((id, target)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let created = state.store.follow_user(&id, &target).await?;
    Ok(Json(json!({ "following": true, "created": created })))
}

pub async fn unfollow_handler(
    State(state): State<AppState>,
    Path((id, target)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    if state.store.unfollow_user(&id, &target).await? {
        Ok(Json(json!({ "following": false })))
    } else {
        Err(AppError::NotFound(format!("User {} does not follow {}", id, target)))
    }
}

pub async fn get_posts_handler(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<Vec<PostWithAuthor>>> {
    let posts = match query.viewer.as_deref() {
        Some(viewer) => state.store.get_feed(viewer).await?,
        None => state.store.get_posts().await?,
    };
    Ok(Json(posts))
}

pub async fn create_post_handler(
    State(state): State<AppState>,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let (author_id, post) = req.into_parts();
    let id = state.store.create_post(&author_id, post).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn get_post_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PostWithAuthor>> {
    found(state.store.get_post(&id).await?, "Post", &id)
}

pub async fn update_post_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<PostPatch>,
) -> AppResult<Json<Value>> {
    let updated = state.store.update_post(&id, patch).await?;
    changed(updated, "updated", "Post", &id)
}

pub async fn delete_post_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let deleted = state.store.delete_post(&id).await?;
    changed(deleted, "deleted", "Post", &id)
}

pub async fn toggle_like_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<LikeRequest>,
) -> AppResult<Json<Value>> {
    let like_state = state.store.toggle_like(&id, &req.user_id).await?;
    Ok(Json(json!({ "liked": like_state.is_liked() })))
}

pub async fn check_liked_handler(
    State(state): State<AppState>,
    Path((id, user)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let liked = state.store.check_liked(&id, &user).await?;
    Ok(Json(json!({ "liked": liked })))
}

pub async fn get_comments_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<CommentWithAuthor>>> {
    Ok(Json(state.store.get_comments(&id).await?))
}

pub async fn create_comment_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<NewComment>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let comment_id = state
        .store
        .create_comment(&id, &req.author_id, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": comment_id }))))
}

pub async fn delete_comment_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let deleted = state.store.delete_comment(&id).await?;
    changed(deleted, "deleted", "Comment", &id)
}

pub async fn stats_handler(State(state): State<AppState>) -> AppResult<Json<CommunityStats>> {
    Ok(Json(state.store.get_community_stats().await?))
}

pub async fn reconcile_handler(
    State(state): State<AppState>,
) -> AppResult<Json<ReconciliationReport>> {
    Ok(Json(state.reconciler.reconcile().await?))
}

pub async fn last_reconcile_handler(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let last_run = state.reconciler.last_run().await?;
    Ok(Json(json!({ "lastReconciledAt": last_run })))
}

// Create community router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Users
        .route("/users", post(create_user_handler))
        .route("/users/{id}", get(get_user_handler).patch(update_user_handler))
        .route("/users/{id}/heartbeat", post(heartbeat_handler))
        .route("/users/{id}/posts", get(get_user_posts_handler))
        .route(
            "/users/{id}/following/{target}",
            get(is_following_handler)
                .put(follow_handler)
                .delete(unfollow_handler),
        )
        // Posts
        .route("/posts", get(get_posts_handler).post(create_post_handler))
        .route(
            "/posts/{id}",
            get(get_post_handler)
                .patch(update_post_handler)
                .delete(delete_post_handler),
        )
        .route("/posts/{id}/likes", post(toggle_like_handler))
        .route("/posts/{id}/likes/{user}", get(check_liked_handler))
        .route(
            "/posts/{id}/comments",
            get(get_comments_handler).post(create_comment_handler),
        )
        // Comments
        .route("/comments/{id}", delete(delete_comment_handler))
        // Stats and maintenance
        .route("/stats", get(stats_handler))
        .route(
            "/admin/reconcile",
            get(last_reconcile_handler).post(reconcile_handler),
        )
        .with_state(state)
}
