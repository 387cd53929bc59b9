use community_store::{
    config::StoreConfig,
    infrastructure::{Counter, SqliteDatabase},
    models::{
        current_time_millis, FollowState, LikeState, NewPost, NewUser, PostPatch,
        UserProfilePatch,
    },
    AppError, CounterReconciler, RelationshipStore,
};
use std::sync::Arc;
use tempfile::TempDir;

async fn open_store() -> RelationshipStore {
    RelationshipStore::open_in_memory(StoreConfig::default())
        .await
        .expect("in-memory store")
}

/// File-backed store with a multi-connection pool. Keep the directory alive
/// for as long as the store is used.
async fn open_file_store(max_connections: u32) -> (TempDir, RelationshipStore) {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite:{}", dir.path().join("community.db").display());
    let db = SqliteDatabase::connect(&url, max_connections)
        .await
        .expect("file-backed database");
    (dir, RelationshipStore::new(Arc::new(db), StoreConfig::default()))
}

async fn add_user(store: &RelationshipStore, id: &str) {
    store
        .create_user(NewUser::new(id, format!("User {}", id)))
        .await
        .expect("create user");
}

#[tokio::test]
async fn test_post_like_scenario() {
    let store = open_store().await;
    add_user(&store, "U1").await;

    let post_id = store
        .create_post("U1", NewPost::new("A", "B").with_tags(["x"]))
        .await
        .unwrap();

    let post = store.get_post(&post_id).await.unwrap().unwrap();
    assert_eq!(post.post.likes_count, 0);
    assert_eq!(post.post.comments_count, 0);
    assert_eq!(post.post.tags, vec!["x".to_string()]);
    assert_eq!(post.author.as_ref().map(|a| a.id.as_str()), Some("U1"));
    assert!(!post.liked);

    assert_eq!(store.toggle_like(&post_id, "U2").await.unwrap(), LikeState::Liked);
    let post = store.get_post(&post_id).await.unwrap().unwrap();
    assert_eq!(post.post.likes_count, 1);
    assert!(store.check_liked(&post_id, "U2").await.unwrap());

    assert_eq!(store.toggle_like(&post_id, "U2").await.unwrap(), LikeState::Unliked);
    let post = store.get_post(&post_id).await.unwrap().unwrap();
    assert_eq!(post.post.likes_count, 0);
    assert!(!store.check_liked(&post_id, "U2").await.unwrap());
}

#[tokio::test]
async fn test_author_posts_counter() {
    let store = open_store().await;
    add_user(&store, "author").await;

    let first = store.create_post("author", NewPost::new("one", "1")).await.unwrap();
    let second = store.create_post("author", NewPost::new("two", "2")).await.unwrap();
    let author = store.get_user("author").await.unwrap().unwrap();
    assert_eq!(author.posts_count, 2);

    let posts = store.get_user_posts("author").await.unwrap();
    let ids: Vec<&str> = posts.iter().map(|p| p.post.id.as_str()).collect();
    assert_eq!(ids, vec![second.as_str(), first.as_str()]);

    assert!(store.delete_post(&first).await.unwrap());
    let author = store.get_user("author").await.unwrap().unwrap();
    assert_eq!(author.posts_count, 1);
    assert!(store.get_post(&first).await.unwrap().is_none());
}

#[tokio::test]
async fn test_comment_counters_round_trip() {
    let store = open_store().await;
    add_user(&store, "writer").await;
    add_user(&store, "reader").await;
    let post_id = store.create_post("writer", NewPost::new("t", "c")).await.unwrap();

    let mut comment_ids = Vec::new();
    for i in 0..5 {
        let id = store
            .create_comment(&post_id, "reader", &format!("comment {}", i))
            .await
            .unwrap();
        comment_ids.push(id);
    }

    let post = store.get_post(&post_id).await.unwrap().unwrap();
    assert_eq!(post.post.comments_count, 5);
    let reader = store.get_user("reader").await.unwrap().unwrap();
    assert_eq!(reader.comments_count, 5);

    let comments = store.get_comments(&post_id).await.unwrap();
    assert_eq!(comments.len(), 5);
    assert_eq!(comments[0].comment.content, "comment 4");
    assert_eq!(comments[0].author.as_ref().unwrap().id, "reader");

    for id in &comment_ids {
        assert!(store.delete_comment(id).await.unwrap());
    }

    let post = store.get_post(&post_id).await.unwrap().unwrap();
    assert_eq!(post.post.comments_count, 0);
    let reader = store.get_user("reader").await.unwrap().unwrap();
    assert_eq!(reader.comments_count, 0);
    assert!(!store.delete_comment(&comment_ids[0]).await.unwrap());
}

#[tokio::test]
async fn test_delete_post_cascades_to_likes_and_comments() {
    let store = open_store().await;
    for id in ["author", "fan", "critic"] {
        add_user(&store, id).await;
    }
    let post_id = store.create_post("author", NewPost::new("t", "c")).await.unwrap();
    store.toggle_like(&post_id, "fan").await.unwrap();
    store.create_comment(&post_id, "fan", "love it").await.unwrap();
    store.create_comment(&post_id, "critic", "meh").await.unwrap();
    store.create_comment(&post_id, "critic", "still meh").await.unwrap();

    assert!(store.delete_post(&post_id).await.unwrap());

    assert!(!store.check_liked(&post_id, "fan").await.unwrap());
    assert!(store.get_comments(&post_id).await.unwrap().is_empty());
    assert_eq!(store.get_user("fan").await.unwrap().unwrap().comments_count, 0);
    assert_eq!(store.get_user("critic").await.unwrap().unwrap().comments_count, 0);
    assert_eq!(store.get_user("author").await.unwrap().unwrap().posts_count, 0);

    let stats = store.get_community_stats().await.unwrap();
    assert_eq!(stats.total_posts, 0);
    assert_eq!(stats.total_likes, 0);

    assert!(!store.delete_post(&post_id).await.unwrap());
}

#[tokio::test]
async fn test_follow_symmetry_and_idempotence() {
    let store = open_store().await;
    add_user(&store, "a").await;
    add_user(&store, "b").await;

    assert!(store.follow_user("a", "b").await.unwrap());
    assert!(!store.follow_user("a", "b").await.unwrap());

    let a = store.get_user("a").await.unwrap().unwrap();
    let b = store.get_user("b").await.unwrap().unwrap();
    assert_eq!((a.following_count, a.followers_count), (1, 0));
    assert_eq!((b.following_count, b.followers_count), (0, 1));
    assert!(store.is_following("a", "b").await.unwrap());
    assert!(!store.is_following("b", "a").await.unwrap());

    assert!(store.unfollow_user("a", "b").await.unwrap());
    assert!(!store.unfollow_user("a", "b").await.unwrap());

    let a = store.get_user("a").await.unwrap().unwrap();
    let b = store.get_user("b").await.unwrap().unwrap();
    assert_eq!(a.following_count, 0);
    assert_eq!(b.followers_count, 0);

    assert_eq!(store.toggle_follow("b", "a").await.unwrap(), FollowState::Following);
    assert_eq!(store.get_user("a").await.unwrap().unwrap().followers_count, 1);
}

#[tokio::test]
async fn test_online_users_counts_recent_heartbeats() {
    let store = open_store().await;
    for id in ["active", "stale", "never"] {
        add_user(&store, id).await;
    }

    assert!(store.update_user_last_active("active").await.unwrap());
    let ten_minutes_ago = current_time_millis() - 10 * 60 * 1000;
    assert!(store.record_user_activity("stale", ten_minutes_ago).await.unwrap());
    assert!(!store.update_user_last_active("missing").await.unwrap());

    let stats = store.get_community_stats().await.unwrap();
    assert_eq!(stats.total_members, 3);
    assert_eq!(stats.online_users, 1);
}

#[tokio::test]
async fn test_total_likes_sums_post_counters() {
    let store = open_store().await;
    add_user(&store, "u").await;
    let p1 = store.create_post("u", NewPost::new("1", "1")).await.unwrap();
    let p2 = store.create_post("u", NewPost::new("2", "2")).await.unwrap();
    for liker in ["x", "y", "z"] {
        store.toggle_like(&p1, liker).await.unwrap();
    }
    store.toggle_like(&p2, "x").await.unwrap();

    let stats = store.get_community_stats().await.unwrap();
    assert_eq!(stats.total_posts, 2);
    assert_eq!(stats.total_likes, 4);
}

#[tokio::test]
async fn test_feed_marks_viewer_likes() {
    let store = open_store().await;
    add_user(&store, "u").await;
    let liked = store.create_post("u", NewPost::new("liked", "c")).await.unwrap();
    let other = store.create_post("u", NewPost::new("other", "c")).await.unwrap();
    store.toggle_like(&liked, "viewer").await.unwrap();

    let feed = store.get_feed("viewer").await.unwrap();
    assert_eq!(feed.len(), 2);
    for item in &feed {
        assert_eq!(item.liked, item.post.id == liked, "post {}", item.post.id);
    }
    assert_eq!(feed[0].post.id, other);

    let anonymous = store.get_posts().await.unwrap();
    assert!(anonymous.iter().all(|p| !p.liked));
}

#[tokio::test]
async fn test_missing_targets_are_noops() {
    let store = open_store().await;

    assert!(store.get_user("nobody").await.unwrap().is_none());
    assert!(store.get_post("nothing").await.unwrap().is_none());
    assert!(store.get_comments("nothing").await.unwrap().is_empty());
    assert!(!store
        .update_user_profile("nobody", UserProfilePatch { bio: Some("hi".into()), ..Default::default() })
        .await
        .unwrap());
    assert!(!store
        .update_post("nothing", PostPatch { title: Some("t".into()), ..Default::default() })
        .await
        .unwrap());
    assert!(!store.delete_post("nothing").await.unwrap());

    assert!(matches!(
        store.toggle_like("nothing", "u").await,
        Err(AppError::NotFound(_))
    ));
    assert!(!store.check_liked("nothing", "u").await.unwrap());
}

#[tokio::test]
async fn test_profile_patch_merges_fields() {
    let store = open_store().await;
    add_user(&store, "u").await;

    let patch = UserProfilePatch {
        bio: Some("  Rustacean  ".into()),
        twitter: Some("@rustlang".into()),
        website: Some("https://example.com".into()),
        ..Default::default()
    };
    assert!(store.update_user_profile("u", patch).await.unwrap());

    let user = store.get_user("u").await.unwrap().unwrap();
    assert_eq!(user.bio.as_deref(), Some("Rustacean"));
    assert_eq!(user.twitter.as_deref(), Some("rustlang"));
    assert_eq!(user.name, "User u");
    assert_eq!(user.posts_count, 0);

    let invalid = UserProfilePatch {
        website: Some("not a url".into()),
        ..Default::default()
    };
    assert!(matches!(
        store.update_user_profile("u", invalid).await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn test_post_patch_keeps_counters() {
    let store = open_store().await;
    add_user(&store, "u").await;
    let post_id = store.create_post("u", NewPost::new("draft", "body")).await.unwrap();
    store.toggle_like(&post_id, "fan").await.unwrap();

    let patch = PostPatch {
        title: Some("final".into()),
        tags: Some(vec![" rust ".into(), "".into()]),
        ..Default::default()
    };
    assert!(store.update_post(&post_id, patch).await.unwrap());

    let post = store.get_post(&post_id).await.unwrap().unwrap().post;
    assert_eq!(post.title, "final");
    assert_eq!(post.content, "body");
    assert_eq!(post.tags, vec!["rust".to_string()]);
    assert_eq!(post.likes_count, 1);
    assert!(post.updated_at >= post.created_at);
}

async fn run_concurrent_toggles(store: RelationshipStore) {
    add_user(&store, "u").await;
    let post_id = store.create_post("u", NewPost::new("hot", "take")).await.unwrap();

    // Users 0..10 toggle three times (ends liked), 10..20 toggle twice (ends unliked)
    let mut handles = Vec::new();
    for i in 0..20 {
        let toggles = if i < 10 { 3 } else { 2 };
        for _ in 0..toggles {
            let store = store.clone();
            let post_id = post_id.clone();
            handles.push(tokio::spawn(async move {
                store.toggle_like(&post_id, &format!("user-{}", i)).await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let post = store.get_post(&post_id).await.unwrap().unwrap();
    assert_eq!(post.post.likes_count, 10);
    for i in 0..20 {
        let liked = store.check_liked(&post_id, &format!("user-{}", i)).await.unwrap();
        assert_eq!(liked, i < 10);
    }

    let reconciler = CounterReconciler::new(store.database());
    assert!(reconciler.reconcile().await.unwrap().is_clean());
}

async fn run_concurrent_follows(store: RelationshipStore) {
    add_user(&store, "a").await;
    add_user(&store, "b").await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.follow_user("a", "b").await })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        if task.await.unwrap().unwrap() {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    let a = store.get_user("a").await.unwrap().unwrap();
    let b = store.get_user("b").await.unwrap().unwrap();
    assert_eq!(a.following_count, 1);
    assert_eq!(b.followers_count, 1);
}

#[tokio::test]
async fn test_concurrent_toggles_keep_counter_equal_to_records() {
    run_concurrent_toggles(open_store().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_toggles_on_shared_file() {
    let (_dir, store) = open_file_store(5).await;
    run_concurrent_toggles(store.clone()).await;
    store.close().await;
}

#[tokio::test]
async fn test_concurrent_follows_do_not_double_count() {
    run_concurrent_follows(open_store().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_follows_on_shared_file() {
    let (_dir, store) = open_file_store(5).await;
    run_concurrent_follows(store.clone()).await;
    store.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reconcile_succeeds_while_writers_run() {
    let (_dir, store) = open_file_store(5).await;
    add_user(&store, "author").await;
    add_user(&store, "idle").await;
    let post_id = store.create_post("author", NewPost::new("busy", "post")).await.unwrap();

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let store = store.clone();
            let post_id = post_id.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    store
                        .toggle_like(&post_id, &format!("fan-{}-{}", w, i % 7))
                        .await?;
                }
                Ok::<_, AppError>(())
            })
        })
        .collect();

    let db = store.database();
    let reconciler = CounterReconciler::new(Arc::clone(&db));
    for round in 0..20 {
        let mut tx = db.begin_transaction().await.unwrap();
        db.set_counter_tx(&mut tx, Counter::UserFollowers, "idle", round + 1)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let report = reconciler
            .reconcile()
            .await
            .unwrap_or_else(|e| panic!("reconcile round {} failed: {}", round, e));
        assert!(report.users_repaired >= 1);
        assert_eq!(store.get_user("idle").await.unwrap().unwrap().followers_count, 0);
    }

    for writer in writers {
        writer.await.unwrap().unwrap();
    }
    assert!(reconciler.reconcile().await.unwrap().is_clean());
    store.close().await;
}

#[tokio::test]
async fn test_reconciler_repairs_injected_drift() {
    let store = open_store().await;
    add_user(&store, "a").await;
    add_user(&store, "b").await;
    let post_id = store.create_post("a", NewPost::new("t", "c")).await.unwrap();
    store.toggle_like(&post_id, "b").await.unwrap();
    store.follow_user("b", "a").await.unwrap();

    let db = store.database();
    let mut tx = db.begin_transaction().await.unwrap();
    db.set_counter_tx(&mut tx, Counter::PostLikes, &post_id, 7)
        .await
        .unwrap();
    db.set_counter_tx(&mut tx, Counter::UserFollowers, "a", 0)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let reconciler = Arc::new(CounterReconciler::new(db));
    let report = reconciler.reconcile().await.unwrap();
    assert_eq!(report.fields_repaired, 2);
    assert_eq!(report.users_repaired, 1);
    assert_eq!(report.posts_repaired, 1);

    assert_eq!(store.get_post(&post_id).await.unwrap().unwrap().post.likes_count, 1);
    assert_eq!(store.get_user("a").await.unwrap().unwrap().followers_count, 1);
}

#[tokio::test]
async fn test_file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("community.db").display());

    let post_id = {
        let db = SqliteDatabase::connect(&url, 2).await.unwrap();
        let store = RelationshipStore::new(Arc::new(db), StoreConfig::default());
        add_user(&store, "u").await;
        let post_id = store.create_post("u", NewPost::new("kept", "on disk")).await.unwrap();
        store.toggle_like(&post_id, "v").await.unwrap();
        store.close().await;
        post_id
    };

    let db = SqliteDatabase::connect(&url, 2).await.unwrap();
    let store = RelationshipStore::new(Arc::new(db), StoreConfig::default());
    let post = store.get_post(&post_id).await.unwrap().unwrap();
    assert_eq!(post.post.title, "kept");
    assert_eq!(post.post.likes_count, 1);
    assert_eq!(store.get_user("u").await.unwrap().unwrap().posts_count, 1);
    store.close().await;
}
