// Demo data for local development
use rand::Rng;
use tracing::info;

use crate::{
    error::AppResult,
    models::{Collection, NewPost, NewUser, UserProfilePatch},
    services::RelationshipStore,
};

const SAMPLE_USERS: [(&str, &str, &str, &str); 8] = [
    ("alice", "Alice Johnson", "alice@example.com", "Software engineer, coffee enthusiast"),
    ("bob", "Bob Smith", "bob@example.com", "Product manager"),
    ("carol", "Carol Wilson", "carol@example.com", "UX designer"),
    ("david", "David Brown", "david@example.com", "Data scientist"),
    ("eve", "Eve Davis", "eve@example.com", "DevOps engineer"),
    ("frank", "Frank Miller", "frank@example.com", "Mobile developer"),
    ("grace", "Grace Lee", "grace@example.com", "Backend engineer"),
    ("henry", "Henry Taylor", "henry@example.com", "Frontend developer"),
];

const SAMPLE_POSTS: [(&str, &str, &[&str]); 8] = [
    ("Shipped our first release", "The new onboarding flow is live. Feedback welcome!", &["release", "engineering"]),
    ("Roadmap planning", "Collecting ideas for next quarter. What should we build?", &["product"]),
    ("Research notes", "Five interviews in, navigation is the top pain point.", &["ux", "research"]),
    ("Model results", "Recall improved after cleaning the training labels.", &["datascience"]),
    ("Zero-downtime deploys", "Rolling restarts are finally boring. Here is the setup.", &["devops"]),
    ("Offline mode", "Sync conflicts are harder than they look.", &["mobile"]),
    ("Query tuning", "An index on (created_at, id) cut feed latency in half.", &["backend", "sql"]),
    ("Bundle size diet", "Dropped two dependencies and lazy loaded the editor.", &["frontend"]),
];

const SAMPLE_COMMENTS: [&str; 5] = [
    "Great write-up, thanks for sharing!",
    "How long did this take you?",
    "We ran into the same thing last month.",
    "Bookmarking this.",
    "Would love a follow-up post.",
];

/// Populate an empty store with a small community. Does nothing if any user exists.
pub async fn seed_demo_community(store: &RelationshipStore) -> AppResult<()> {
    if store.database().count_documents(Collection::Users).await? > 0 {
        info!("Demo seed skipped, store already has users");
        return Ok(());
    }

    for (id, name, email, bio) in SAMPLE_USERS {
        store
            .create_user(NewUser::new(id, name).with_email(email))
            .await?;
        let patch = UserProfilePatch {
            bio: Some(bio.to_string()),
            location: Some("San Francisco, CA".to_string()),
            ..Default::default()
        };
        store.update_user_profile(id, patch).await?;
    }
    info!("Seeded {} users", SAMPLE_USERS.len());

    let mut post_ids = Vec::with_capacity(SAMPLE_POSTS.len());
    for (i, (title, content, tags)) in SAMPLE_POSTS.iter().enumerate() {
        let (author_id, ..) = SAMPLE_USERS[i % SAMPLE_USERS.len()];
        let post = NewPost::new(*title, *content).with_tags(tags.iter().copied());
        post_ids.push(store.create_post(author_id, post).await?);
    }
    info!("Seeded {} posts", post_ids.len());

    // ThreadRng is not Send; drop it before the next await
    let (follows, likes, comments) = {
        let mut rng = rand::rng();
        let mut follows = Vec::new();
        let mut likes = Vec::new();
        let mut comments = Vec::new();

        for (follower, ..) in SAMPLE_USERS {
            for (following, ..) in SAMPLE_USERS {
                if follower != following && rng.random_bool(0.35) {
                    follows.push((follower, following));
                }
            }
            for post_id in &post_ids {
                if rng.random_bool(0.4) {
                    likes.push((post_id.clone(), follower));
                }
                if rng.random_bool(0.15) {
                    let text = SAMPLE_COMMENTS[rng.random_range(0..SAMPLE_COMMENTS.len())];
                    comments.push((post_id.clone(), follower, text));
                }
            }
        }
        (follows, likes, comments)
    };

    for (follower, following) in &follows {
        store.follow_user(follower, following).await?;
    }
    for (post_id, user_id) in &likes {
        store.toggle_like(post_id, user_id).await?;
    }
    for (post_id, author_id, text) in &comments {
        store.create_comment(post_id, author_id, text).await?;
    }

    info!(
        "Seeded {} follows, {} likes and {} comments",
        follows.len(),
        likes.len(),
        comments.len()
    );
    Ok(())
}
