use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{require_text, DocumentId, Timestamp};
use crate::error::{AppError, AppResult};

static TWITTER_HANDLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{1,15}$").expect("valid twitter handle regex"));
static GITHUB_HANDLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9]|-[A-Za-z0-9]){0,38}$").expect("valid github handle regex")
});
static WEBSITE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("valid website regex"));

/// A member of the community with the denormalized counters that other
/// collections keep up to date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: DocumentId,
    pub name: String,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub twitter: Option<String>,
    pub github: Option<String>,
    pub avatar_url: Option<String>,
    pub posts_count: i64,
    pub comments_count: i64,
    pub followers_count: i64,
    pub following_count: i64,
    pub last_active_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Signup payload. The id comes from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewUser {
    pub id: DocumentId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl NewUser {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn validate(&self) -> AppResult<()> {
        require_text("id", &self.id)?;
        require_text("name", &self.name)?;
        Ok(())
    }

    pub fn into_profile(self, now: Timestamp) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.trim().to_string(),
            email: self.email,
            bio: None,
            location: None,
            website: None,
            twitter: None,
            github: None,
            avatar_url: None,
            posts_count: 0,
            comments_count: 0,
            followers_count: 0,
            following_count: 0,
            last_active_at: None,
            created_at: now,
        }
    }
}

/// Profile fields a user may edit from the settings page. Counters and
/// timestamps cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserProfilePatch {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub twitter: Option<String>,
    pub github: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.bio.is_none()
            && self.location.is_none()
            && self.website.is_none()
            && self.twitter.is_none()
            && self.github.is_none()
            && self.avatar_url.is_none()
    }

    /// Trims every provided field, strips a leading `@` from handles and
    /// checks their syntax. An empty string clears an optional field.
    pub fn normalized(self) -> AppResult<Self> {
        let trim = |value: Option<String>| value.map(|v| v.trim().to_string());
        let handle = |value: Option<String>| {
            value.map(|v| v.trim().trim_start_matches('@').to_string())
        };

        let patch = Self {
            name: trim(self.name),
            bio: trim(self.bio),
            location: trim(self.location),
            website: trim(self.website),
            twitter: handle(self.twitter),
            github: handle(self.github),
            avatar_url: trim(self.avatar_url),
        };

        if let Some(name) = &patch.name {
            require_text("name", name)?;
        }
        if let Some(website) = patch.website.as_deref().filter(|w| !w.is_empty()) {
            if !WEBSITE_URL.is_match(website) {
                return Err(AppError::Validation(format!(
                    "website must be an http(s) URL, got {}",
                    website
                )));
            }
        }
        if let Some(twitter) = patch.twitter.as_deref().filter(|t| !t.is_empty()) {
            if !TWITTER_HANDLE.is_match(twitter) {
                return Err(AppError::Validation(format!("invalid twitter handle {}", twitter)));
            }
        }
        if let Some(github) = patch.github.as_deref().filter(|g| !g.is_empty()) {
            if !GITHUB_HANDLE.is_match(github) {
                return Err(AppError::Validation(format!("invalid github handle {}", github)));
            }
        }

        Ok(patch)
    }
}
