use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use community_store::{
    app_state::AppState,
    config::{Config, DatabaseConfig, ServerConfig, StoreConfig},
    http_interface::create_router,
    RelationshipStore,
};

async fn test_app() -> Router {
    let config = Config {
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        store: StoreConfig::default(),
        seed_demo_data: false,
    };
    let store = RelationshipStore::open_in_memory(config.store.clone()).await.unwrap();
    create_router(AppState::from_store(store, config))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let app = test_app().await;
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_user_signup_and_profile() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/users",
        Some(json!({ "id": "u1", "name": "Ada", "email": "ada@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["postsCount"], 0);
    assert_eq!(body["followersCount"], 0);

    let (status, body) = send(&app, Method::POST, "/users", Some(json!({ "id": "u1", "name": "Again" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], 409);

    let (status, _) = send(&app, Method::PATCH, "/users/u1", Some(json!({ "github": "@ada" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/users/u1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["github"], "ada");
    assert_eq!(body["name"], "Ada");

    let (status, _) = send(&app, Method::PATCH, "/users/u1", Some(json!({ "website": "ftp://nope" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/users/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::PATCH, "/users/ghost", Some(json!({ "bio": "x" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::POST, "/users/ghost/heartbeat", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_post_like_comment_flow() {
    let app = test_app().await;
    send(&app, Method::POST, "/users", Some(json!({ "id": "u1", "name": "Ada" }))).await;
    send(&app, Method::POST, "/users", Some(json!({ "id": "u2", "name": "Bob" }))).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/posts",
        Some(json!({ "authorId": "u1", "title": "A", "content": "B", "tags": ["x"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::POST, &format!("/posts/{}/likes", post_id), Some(json!({ "userId": "u2" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["liked"], true);

    let (_, body) = send(&app, Method::GET, &format!("/posts/{}/likes/u2", post_id), None).await;
    assert_eq!(body["liked"], true);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/posts/{}/comments", post_id),
        Some(json!({ "authorId": "u2", "content": "nice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::GET, &format!("/posts/{}", post_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["likesCount"], 1);
    assert_eq!(body["commentsCount"], 1);
    assert_eq!(body["author"]["id"], "u1");
    assert_eq!(body["tags"], json!(["x"]));

    let (_, body) = send(&app, Method::GET, "/posts?viewer=u2", None).await;
    assert_eq!(body[0]["liked"], true);
    let (_, body) = send(&app, Method::GET, "/posts", None).await;
    assert_eq!(body[0]["liked"], false);

    let (_, body) = send(&app, Method::GET, &format!("/posts/{}/comments", post_id), None).await;
    assert_eq!(body[0]["content"], "nice");
    assert_eq!(body[0]["author"]["name"], "Bob");

    let (status, _) = send(&app, Method::DELETE, &format!("/comments/{}", comment_id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::DELETE, &format!("/comments/{}", comment_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::PATCH, &format!("/posts/{}", post_id), Some(json!({ "title": "A2" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, Method::GET, "/stats", None).await;
    assert_eq!(body["totalMembers"], 2);
    assert_eq!(body["totalPosts"], 1);
    assert_eq!(body["totalLikes"], 1);

    let (status, _) = send(&app, Method::DELETE, &format!("/posts/{}", post_id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &format!("/posts/{}", post_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_post_validation_and_missing_author() {
    let app = test_app().await;
    send(&app, Method::POST, "/users", Some(json!({ "id": "u1", "name": "Ada" }))).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/posts",
        Some(json!({ "authorId": "u1", "title": "  ", "content": "B" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let (status, _) = send(
        &app,
        Method::POST,
        "/posts",
        Some(json!({ "authorId": "ghost", "title": "A", "content": "B" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, "/posts/missing/likes", Some(json!({ "userId": "u1" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_follow_endpoints() {
    let app = test_app().await;
    send(&app, Method::POST, "/users", Some(json!({ "id": "a", "name": "A" }))).await;
    send(&app, Method::POST, "/users", Some(json!({ "id": "b", "name": "B" }))).await;

    let (status, body) = send(&app, Method::PUT, "/users/a/following/b", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], true);
    let (_, body) = send(&app, Method::PUT, "/users/a/following/b", None).await;
    assert_eq!(body["created"], false);

    let (_, body) = send(&app, Method::GET, "/users/a/following/b", None).await;
    assert_eq!(body["following"], true);
    let (_, body) = send(&app, Method::GET, "/users/b", None).await;
    assert_eq!(body["followersCount"], 1);

    let (status, _) = send(&app, Method::PUT, "/users/a/following/a", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::DELETE, "/users/a/following/b", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::DELETE, "/users/a/following/b", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reconcile_endpoint_reports_clean_store() {
    let app = test_app().await;
    let (_, body) = send(&app, Method::GET, "/admin/reconcile", None).await;
    assert!(body["lastReconciledAt"].is_null());

    let (status, body) = send(&app, Method::POST, "/admin/reconcile", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fieldsRepaired"], 0);
    assert_eq!(body["usersRepaired"], 0);
    let reconciled_at = body["reconciledAt"].clone();

    let (_, body) = send(&app, Method::GET, "/admin/reconcile", None).await;
    assert_eq!(body["lastReconciledAt"], reconciled_at);
}
