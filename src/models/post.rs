use serde::{Deserialize, Serialize};

use super::{normalize_tags, require_text, DocumentId, Timestamp, UserProfile};
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: DocumentId,
    pub author_id: DocumentId,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A post as callers see it: the author joined inline, plus whether the
/// viewer (if any) likes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostWithAuthor {
    #[serde(flatten)]
    pub post: Post,
    pub author: Option<UserProfile>,
    #[serde(default)]
    pub liked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl NewPost {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
            image_url: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn into_post(self, id: DocumentId, author_id: DocumentId, now: Timestamp) -> AppResult<Post> {
        require_text("title", &self.title)?;
        require_text("content", &self.content)?;
        Ok(Post {
            id,
            author_id,
            title: self.title.trim().to_string(),
            content: self.content,
            tags: normalize_tags(self.tags),
            image_url: self.image_url.filter(|url| !url.trim().is_empty()),
            likes_count: 0,
            comments_count: 0,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Fields editable after publishing. Counters and ownership never change
/// through a patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub image_url: Option<String>,
}

impl PostPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.tags.is_none() && self.image_url.is_none()
    }

    pub fn normalized(self) -> AppResult<Self> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        if let Some(content) = &self.content {
            require_text("content", content)?;
        }
        Ok(Self {
            title: self.title.map(|t| t.trim().to_string()),
            content: self.content,
            tags: self.tags.map(normalize_tags),
            image_url: self.image_url.map(|url| url.trim().to_string()),
        })
    }
}
