use async_trait::async_trait;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{QueryBuilder, Row};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{
    Counter, CounterDrift, DatabaseInterface, DatabaseTransaction, PostQuery,
};
use crate::models::{
    Collection, Comment, DocumentId, Follow, Like, Post, PostPatch, Timestamp, UserProfile,
    UserProfilePatch,
};

const USER_COLUMNS: &str = "id, name, email, bio, location, website, twitter, github, avatar_url, \
     posts_count, comments_count, followers_count, following_count, last_active_at, created_at";
const POST_COLUMNS: &str = "id, author_id, title, content, tags, image_url, likes_count, \
     comments_count, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, post_id, author_id, content, likes_count, created_at";

const SCHEMA: [&str; 13] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT,
        bio TEXT,
        location TEXT,
        website TEXT,
        twitter TEXT,
        github TEXT,
        avatar_url TEXT,
        posts_count INTEGER NOT NULL DEFAULT 0,
        comments_count INTEGER NOT NULL DEFAULT 0,
        followers_count INTEGER NOT NULL DEFAULT 0,
        following_count INTEGER NOT NULL DEFAULT 0,
        last_active_at INTEGER,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        author_id TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '[]',
        image_url TEXT,
        likes_count INTEGER NOT NULL DEFAULT 0,
        comments_count INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id TEXT PRIMARY KEY,
        post_id TEXT NOT NULL,
        author_id TEXT NOT NULL,
        content TEXT NOT NULL,
        likes_count INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS likes (
        post_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (post_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS follows (
        follower_id TEXT NOT NULL,
        following_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (follower_id, following_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reconciliations (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        last_run_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_users_last_active ON users(last_active_at)",
    "CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_comments_author ON comments(author_id)",
    "CREATE INDEX IF NOT EXISTS idx_likes_user ON likes(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_follows_following ON follows(following_id)",
];

fn user_from_row(row: &SqliteRow) -> AppResult<UserProfile> {
    Ok(UserProfile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        bio: row.try_get("bio")?,
        location: row.try_get("location")?,
        website: row.try_get("website")?,
        twitter: row.try_get("twitter")?,
        github: row.try_get("github")?,
        avatar_url: row.try_get("avatar_url")?,
        posts_count: row.try_get("posts_count")?,
        comments_count: row.try_get("comments_count")?,
        followers_count: row.try_get("followers_count")?,
        following_count: row.try_get("following_count")?,
        last_active_at: row.try_get("last_active_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn post_from_row(row: &SqliteRow) -> AppResult<Post> {
    let tags: String = row.try_get("tags")?;
    Ok(Post {
        id: row.try_get("id")?,
        author_id: row.try_get("author_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        tags: serde_json::from_str(&tags)?,
        image_url: row.try_get("image_url")?,
        likes_count: row.try_get("likes_count")?,
        comments_count: row.try_get("comments_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn comment_from_row(row: &SqliteRow) -> AppResult<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        author_id: row.try_get("author_id")?,
        content: row.try_get("content")?,
        likes_count: row.try_get("likes_count")?,
        created_at: row.try_get("created_at")?,
    })
}

fn count_from_row(row: &SqliteRow) -> AppResult<u64> {
    let count: i64 = row.try_get("count")?;
    Ok(count.max(0) as u64)
}

/// Creates the directory that will hold a file-backed database, if the URL
/// names one.
pub fn ensure_parent_dir(url: &str) -> AppResult<()> {
    let Some(path) = url.strip_prefix("sqlite:") else {
        return Ok(());
    };
    let path = path.trim_start_matches("//");
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.contains(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::ConfigurationError(format!(
                "Failed to create database directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// SQLite implementation of the community database
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (creating if needed) a file-backed database and its schema
    pub async fn connect(url: &str, max_connections: u32) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::ConfigurationError(format!("Invalid database URL {}: {}", url, e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to {}: {}", url, e)))?;

        let db = Self { pool };
        db.initialize().await?;
        info!("Opened SQLite database at {}", url);
        Ok(db)
    }

    /// In-memory database for tests. A single connection is kept alive for
    /// the pool's lifetime since every connection would otherwise see its
    /// own empty database.
    pub async fn new_in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to in-memory SQLite: {}", e))
            })?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// Create the collections and their indexes if they are missing
    pub async fn initialize(&self) -> AppResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to initialize schema: {}", e)))?;
        }
        debug!("Community schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn sqlite_tx<'a>(
        tx: &'a mut DatabaseTransaction,
    ) -> &'a mut sqlx::Transaction<'static, Sqlite> {
        tx.as_sqlite_mut()
    }
}

#[async_trait]
impl DatabaseInterface for SqliteDatabase {
    async fn begin_transaction(&self) -> AppResult<DatabaseTransaction> {
        let tx =
            self.pool.begin().await.map_err(|e| {
                AppError::DatabaseError(format!("Failed to begin transaction: {}", e))
            })?;
        Ok(DatabaseTransaction::new_sqlite(tx))
    }

    async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Database health check failed: {}", e)))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn get_user(&self, id: &str) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to get user {}: {}", id, e)))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_users(&self, ids: &[DocumentId]) -> AppResult<Vec<UserProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM users WHERE id IN (",
            USER_COLUMNS
        ));
        let mut separated = qb.separated(",");
        for id in ids {
            separated.push_bind(id.clone());
        }
        qb.push(")");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to get users: {}", e)))?;
        rows.iter().map(user_from_row).collect()
    }

    async fn get_post(&self, id: &str) -> AppResult<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to get post {}: {}", id, e)))?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn query_posts(&self, query: PostQuery) -> AppResult<Vec<Post>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM posts", POST_COLUMNS));
        if let Some(author_id) = query.author_id {
            qb.push(" WHERE author_id = ");
            qb.push_bind(author_id);
        }
        qb.push(" ORDER BY created_at DESC, rowid DESC");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to query posts: {}", e)))?;
        rows.iter().map(post_from_row).collect()
    }

    async fn query_comments(&self, post_id: &str) -> AppResult<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM comments WHERE post_id = ? ORDER BY created_at DESC, rowid DESC",
            COMMENT_COLUMNS
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to get comments for post {}: {}", post_id, e))
        })?;
        rows.iter().map(comment_from_row).collect()
    }

    async fn like_exists(&self, post_id: &str, user_id: &str) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM likes WHERE post_id = ? AND user_id = ?")
            .bind(post_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to check like: {}", e)))?;
        Ok(row.is_some())
    }

    async fn liked_post_ids(
        &self,
        user_id: &str,
        post_ids: &[DocumentId],
    ) -> AppResult<HashSet<DocumentId>> {
        if post_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT post_id FROM likes WHERE user_id = ");
        qb.push_bind(user_id.to_string());
        qb.push(" AND post_id IN (");
        let mut separated = qb.separated(",");
        for id in post_ids {
            separated.push_bind(id.clone());
        }
        qb.push(")");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to get liked posts: {}", e)))?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("post_id").map_err(AppError::from))
            .collect()
    }

    async fn follow_exists(&self, follower_id: &str, following_id: &str) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM follows WHERE follower_id = ? AND following_id = ?")
            .bind(follower_id)
            .bind(following_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to check follow: {}", e)))?;
        Ok(row.is_some())
    }

    async fn count_documents(&self, collection: Collection) -> AppResult<u64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {}", collection.as_str()))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count {}: {}", collection, e)))?;
        count_from_row(&row)
    }

    async fn count_users_active_since(&self, since: Timestamp) -> AppResult<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM users WHERE last_active_at IS NOT NULL AND last_active_at >= ?",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to count active users: {}", e)))?;
        count_from_row(&row)
    }

    async fn sum_post_likes(&self) -> AppResult<u64> {
        let row = sqlx::query("SELECT COALESCE(SUM(likes_count), 0) AS count FROM posts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to sum post likes: {}", e)))?;
        count_from_row(&row)
    }

    async fn insert_user_tx(
        &self,
        tx: &mut DatabaseTransaction,
        user: &UserProfile,
    ) -> AppResult<bool> {
        let result = sqlx::query(&format!(
            "INSERT INTO users ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT(id) DO NOTHING",
            USER_COLUMNS
        ))
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.bio)
        .bind(&user.location)
        .bind(&user.website)
        .bind(&user.twitter)
        .bind(&user.github)
        .bind(&user.avatar_url)
        .bind(user.posts_count)
        .bind(user.comments_count)
        .bind(user.followers_count)
        .bind(user.following_count)
        .bind(user.last_active_at)
        .bind(user.created_at)
        .execute(&mut **Self::sqlite_tx(tx))
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create user {}: {}", user.id, e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_user_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: &str,
        patch: &UserProfilePatch,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET name = COALESCE(?, name), bio = COALESCE(?, bio), \
             location = COALESCE(?, location), website = COALESCE(?, website), \
             twitter = COALESCE(?, twitter), github = COALESCE(?, github), \
             avatar_url = COALESCE(?, avatar_url) WHERE id = ?",
        )
        .bind(&patch.name)
        .bind(&patch.bio)
        .bind(&patch.location)
        .bind(&patch.website)
        .bind(&patch.twitter)
        .bind(&patch.github)
        .bind(&patch.avatar_url)
        .bind(id)
        .execute(&mut **Self::sqlite_tx(tx))
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update user {}: {}", id, e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_user_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: &str,
        at: Timestamp,
    ) -> AppResult<bool> {
        let result = sqlx::query("UPDATE users SET last_active_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&mut **Self::sqlite_tx(tx))
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to stamp activity for user {}: {}", id, e))
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_post_tx(&self, tx: &mut DatabaseTransaction, post: &Post) -> AppResult<()> {
        let tags = serde_json::to_string(&post.tags)?;
        sqlx::query(&format!(
            "INSERT INTO posts ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            POST_COLUMNS
        ))
        .bind(&post.id)
        .bind(&post.author_id)
        .bind(&post.title)
        .bind(&post.content)
        .bind(tags)
        .bind(&post.image_url)
        .bind(post.likes_count)
        .bind(post.comments_count)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&mut **Self::sqlite_tx(tx))
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create post {}: {}", post.id, e)))?;
        Ok(())
    }

    async fn update_post_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: &str,
        patch: &PostPatch,
        at: Timestamp,
    ) -> AppResult<bool> {
        let tags = patch.tags.as_ref().map(serde_json::to_string).transpose()?;
        let result = sqlx::query(
            "UPDATE posts SET title = COALESCE(?, title), content = COALESCE(?, content), \
             tags = COALESCE(?, tags), image_url = COALESCE(?, image_url), updated_at = ? \
             WHERE id = ?",
        )
        .bind(&patch.title)
        .bind(&patch.content)
        .bind(tags)
        .bind(&patch.image_url)
        .bind(at)
        .bind(id)
        .execute(&mut **Self::sqlite_tx(tx))
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update post {}: {}", id, e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_post_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: &str,
    ) -> AppResult<Option<Post>> {
        let row = sqlx::query(&format!("DELETE FROM posts WHERE id = ? RETURNING {}", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&mut **Self::sqlite_tx(tx))
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete post {}: {}", id, e)))?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn insert_comment_tx(
        &self,
        tx: &mut DatabaseTransaction,
        comment: &Comment,
    ) -> AppResult<()> {
        sqlx::query(&format!(
            "INSERT INTO comments ({}) VALUES (?, ?, ?, ?, ?, ?)",
            COMMENT_COLUMNS
        ))
        .bind(&comment.id)
        .bind(&comment.post_id)
        .bind(&comment.author_id)
        .bind(&comment.content)
        .bind(comment.likes_count)
        .bind(comment.created_at)
        .execute(&mut **Self::sqlite_tx(tx))
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to create comment {}: {}", comment.id, e))
        })?;
        Ok(())
    }

    async fn delete_comment_tx(
        &self,
        tx: &mut DatabaseTransaction,
        id: &str,
    ) -> AppResult<Option<Comment>> {
        let row = sqlx::query(&format!(
            "DELETE FROM comments WHERE id = ? RETURNING {}",
            COMMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut **Self::sqlite_tx(tx))
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to delete comment {}: {}", id, e)))?;
        row.as_ref().map(comment_from_row).transpose()
    }

    async fn delete_comments_for_post_tx(
        &self,
        tx: &mut DatabaseTransaction,
        post_id: &str,
    ) -> AppResult<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "DELETE FROM comments WHERE post_id = ? RETURNING {}",
            COMMENT_COLUMNS
        ))
        .bind(post_id)
        .fetch_all(&mut **Self::sqlite_tx(tx))
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to delete comments of post {}: {}", post_id, e))
        })?;
        rows.iter().map(comment_from_row).collect()
    }

    async fn insert_like_tx(&self, tx: &mut DatabaseTransaction, like: &Like) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO likes (post_id, user_id, created_at) VALUES (?, ?, ?) \
             ON CONFLICT(post_id, user_id) DO NOTHING",
        )
        .bind(&like.post_id)
        .bind(&like.user_id)
        .bind(like.created_at)
        .execute(&mut **Self::sqlite_tx(tx))
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create like: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_like_tx(
        &self,
        tx: &mut DatabaseTransaction,
        post_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM likes WHERE post_id = ? AND user_id = ?")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut **Self::sqlite_tx(tx))
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete like: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_likes_for_post_tx(
        &self,
        tx: &mut DatabaseTransaction,
        post_id: &str,
    ) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM likes WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut **Self::sqlite_tx(tx))
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to delete likes of post {}: {}", post_id, e))
            })?;
        Ok(result.rows_affected())
    }

    async fn insert_follow_tx(
        &self,
        tx: &mut DatabaseTransaction,
        follow: &Follow,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO follows (follower_id, following_id, created_at) VALUES (?, ?, ?) \
             ON CONFLICT(follower_id, following_id) DO NOTHING",
        )
        .bind(&follow.follower_id)
        .bind(&follow.following_id)
        .bind(follow.created_at)
        .execute(&mut **Self::sqlite_tx(tx))
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create follow: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_follow_tx(
        &self,
        tx: &mut DatabaseTransaction,
        follower_id: &str,
        following_id: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND following_id = ?")
            .bind(follower_id)
            .bind(following_id)
            .execute(&mut **Self::sqlite_tx(tx))
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete follow: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn adjust_counter_tx(
        &self,
        tx: &mut DatabaseTransaction,
        counter: Counter,
        id: &str,
        delta: i64,
    ) -> AppResult<bool> {
        // Table and column names come from the closed Counter enum.
        let sql = format!(
            "UPDATE {table} SET {field} = {field} + ? WHERE id = ?",
            table = counter.owner().as_str(),
            field = counter.field()
        );
        let result = sqlx::query(&sql)
            .bind(delta)
            .bind(id)
            .execute(&mut **Self::sqlite_tx(tx))
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to adjust {:?} on {}: {}", counter, id, e))
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn stamp_reconciliation_tx(
        &self,
        tx: &mut DatabaseTransaction,
        at: Timestamp,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO reconciliations (id, last_run_at) VALUES (1, ?) \
             ON CONFLICT(id) DO UPDATE SET last_run_at = excluded.last_run_at",
        )
        .bind(at)
        .execute(&mut **Self::sqlite_tx(tx))
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to stamp reconciliation: {}", e)))?;
        Ok(())
    }

    async fn last_reconciliation(&self) -> AppResult<Option<Timestamp>> {
        let row = sqlx::query("SELECT last_run_at FROM reconciliations WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to read last reconciliation: {}", e))
            })?;
        row.map(|row| row.try_get("last_run_at").map_err(AppError::from))
            .transpose()
    }

    async fn find_counter_drift_tx(
        &self,
        tx: &mut DatabaseTransaction,
        counter: Counter,
    ) -> AppResult<Vec<CounterDrift>> {
        let (source, foreign_key) = counter.source();
        let sql = format!(
            "SELECT id, stored, actual FROM (\
                SELECT o.id AS id, o.{field} AS stored, \
                (SELECT COUNT(*) FROM {source} s WHERE s.{foreign_key} = o.id) AS actual \
                FROM {owner} o\
             ) WHERE stored != actual ORDER BY id",
            field = counter.field(),
            source = source.as_str(),
            foreign_key = foreign_key,
            owner = counter.owner().as_str()
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&mut **Self::sqlite_tx(tx))
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to scan {:?} for drift: {}", counter, e))
            })?;

        rows.iter()
            .map(|row| -> AppResult<CounterDrift> {
                Ok(CounterDrift {
                    counter,
                    id: row.try_get("id")?,
                    stored: row.try_get("stored")?,
                    actual: row.try_get("actual")?,
                })
            })
            .collect()
    }

    async fn set_counter_tx(
        &self,
        tx: &mut DatabaseTransaction,
        counter: Counter,
        id: &str,
        value: i64,
    ) -> AppResult<bool> {
        let sql = format!(
            "UPDATE {table} SET {field} = ? WHERE id = ?",
            table = counter.owner().as_str(),
            field = counter.field()
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(id)
            .execute(&mut **Self::sqlite_tx(tx))
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to set {:?} on {}: {}", counter, id, e))
            })?;
        Ok(result.rows_affected() > 0)
    }
}
