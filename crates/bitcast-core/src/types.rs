//! Core types for the Bitcast client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated identity retained after a successful sign-in.
///
/// This is also the persisted session record. Field names follow the
/// camelCase record format; the snake_case names returned by the
/// verification endpoint are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Wallet address the session was issued for
    #[serde(alias = "identity_address", alias = "address", default)]
    pub identity_address: String,
    /// Bearer token for authenticated API calls
    #[serde(alias = "access_token")]
    pub access_token: String,
    /// When the session was issued
    #[serde(alias = "issued_at", default = "Utc::now")]
    pub issued_at: DateTime<Utc>,
}

impl Session {
    pub fn new(identity_address: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            identity_address: identity_address.into(),
            access_token: access_token.into(),
            issued_at: Utc::now(),
        }
    }

    /// Whether this session belongs to `address`.
    ///
    /// Wallet addresses are hex and may arrive checksummed, so the
    /// comparison ignores ASCII case.
    pub fn matches_address(&self, address: &str) -> bool {
        !self.identity_address.is_empty() && self.identity_address.eq_ignore_ascii_case(address)
    }
}

/// Unique identifier of a post
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostId(pub String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Media attached to a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaRef {
    /// Directly hosted image or video
    Url(String),
    /// Embedded TikTok video
    TikTok(String),
}

/// A single feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_address: String,
    pub topic_label: String,
    pub caption_text: String,
    pub created_at: DateTime<Utc>,
    pub upvote_count: i64,
    /// Viewer-relative: only meaningful for the session that fetched it
    pub viewer_has_upvoted: bool,
    /// Viewer-relative: only meaningful for the session that fetched it
    pub viewer_has_downvoted: bool,
    pub media: Option<MediaRef>,
}

impl Post {
    /// Copy of this post with the viewer-relative flags cleared.
    pub fn without_viewer_state(&self) -> Self {
        Self {
            viewer_has_upvoted: false,
            viewer_has_downvoted: false,
            ..self.clone()
        }
    }
}

/// Shorten a wallet address for display: `0x1234...abcd`.
pub fn shorten_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
