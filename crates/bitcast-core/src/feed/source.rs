//! Where feed pages come from.
//!
//! [`FeedDataSource`] is the seam the [`FeedQueryEngine`](super::FeedQueryEngine)
//! fetches through. [`HttpFeedSource`] is the production implementation: a
//! GET against the posts endpoint, authenticated with the stored session's
//! access token when there is one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::filter::FilterState;
use crate::error::FeedError;
use crate::storage::SessionStore;
use crate::types::{MediaRef, Post, PostId};

/// Fetches one page of posts for a query.
///
/// An empty page means the feed is exhausted for that query.
#[async_trait]
pub trait FeedDataSource: Send + Sync {
    async fn fetch_page(&self, query: &FilterState) -> Result<Vec<Post>, FeedError>;
}

/// Response wrapper used by every API endpoint: `{ "data": ... }`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct DocsPage {
    docs: Vec<PostRecord>,
}

#[derive(Debug, Deserialize)]
struct AuthorRecord {
    address: String,
}

#[derive(Debug, Deserialize)]
struct TopicRecord {
    title: String,
}

/// A post as the API serializes it
#[derive(Debug, Deserialize)]
struct PostRecord {
    #[serde(rename = "_id")]
    id: String,
    author: AuthorRecord,
    topic: Option<TopicRecord>,
    #[serde(default)]
    caption: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    upvotes: i64,
    #[serde(default)]
    upvoted: bool,
    #[serde(default)]
    downvoted: bool,
    tiktok: Option<String>,
    media_url: Option<String>,
}

impl From<PostRecord> for Post {
    fn from(record: PostRecord) -> Self {
        let media = match (record.tiktok, record.media_url) {
            (Some(tiktok), _) if !tiktok.is_empty() => Some(MediaRef::TikTok(tiktok)),
            (_, Some(url)) if !url.is_empty() => Some(MediaRef::Url(url)),
            _ => None,
        };
        Post {
            id: PostId::new(record.id),
            author_address: record.author.address,
            topic_label: record.topic.map(|t| t.title).unwrap_or_default(),
            caption_text: record.caption,
            created_at: record.created_at,
            upvote_count: record.upvotes,
            viewer_has_upvoted: record.upvoted,
            viewer_has_downvoted: record.downvoted,
            media,
        }
    }
}

/// Decode a posts response body into feed entries.
pub(crate) fn parse_posts_response(body: &str) -> Result<Vec<Post>, FeedError> {
    let envelope: ApiEnvelope<DocsPage> = serde_json::from_str(body)
        .map_err(|e| FeedError::FetchFailed(format!("malformed posts response: {}", e)))?;
    let page = envelope
        .data
        .ok_or_else(|| FeedError::FetchFailed("posts response has no data".to_string()))?;
    Ok(page.docs.into_iter().map(Post::from).collect())
}

/// Feed source backed by the Bitcast HTTP API.
pub struct HttpFeedSource {
    client: reqwest::Client,
    endpoint: String,
    store: Arc<dyn SessionStore>,
}

impl HttpFeedSource {
    pub fn new(
        endpoint: impl Into<String>,
        store: Arc<dyn SessionStore>,
        timeout: Duration,
    ) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::FetchFailed(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, endpoint, store))
    }

    pub fn with_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            store,
        }
    }

    fn access_token(&self) -> Option<String> {
        match self.store.get() {
            Ok(session) => session.map(|s| s.access_token),
            Err(e) => {
                warn!(error = %e, "Could not read session, fetching anonymously");
                None
            }
        }
    }
}

#[async_trait]
impl FeedDataSource for HttpFeedSource {
    async fn fetch_page(&self, query: &FilterState) -> Result<Vec<Post>, FeedError> {
        let mut request = self.client.get(&self.endpoint).query(&query.query_pairs());

        if let Some(token) = self.access_token() {
            request = request.bearer_auth(token);
        }

        debug!(page = query.page(), sort = query.sort_key().as_query(), "Fetching posts");

        let response = request
            .send()
            .await
            .map_err(|e| FeedError::FetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::FetchFailed(format!("server returned {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::FetchFailed(e.to_string()))?;

        parse_posts_response(&body)
    }
}
