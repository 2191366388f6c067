//! Paginated feed with single-flight fetching.
//!
//! The [`FeedQueryEngine`] owns the current [`FilterState`] and the
//! accumulated list of posts. Every fetch goes through one [`RequestLock`],
//! so the list is never touched by two overlapping responses.
//!
//! Each filter change or identity change starts a new *epoch*. A response
//! that arrives for an older epoch is discarded, and the reload for the new
//! epoch is queued behind whatever fetch currently holds the lock. The queued
//! reload stays pending until a first page for its epoch is committed or
//! fails, so a cancelled fetch leaves it for the next caller.

pub mod filter;
pub mod lock;
pub mod source;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub use filter::{FilterState, FilterUpdate, SinceWindow, SortDirection, SortKey};
pub use lock::{RequestLock, RequestPermit};
pub use source::{FeedDataSource, HttpFeedSource};

use crate::auth::SessionEvent;
use crate::error::FeedError;
use crate::notice::NoticeBus;
use crate::subscription::Subscription;
use crate::types::{Post, PostId};

/// Notice shown when a page load fails
pub const FETCH_FAILED_NOTICE: &str = "Error fetching posts";

const DEFAULT_UPDATE_CAPACITY: usize = 256;

/// Change to the accumulated feed, for observers.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedUpdate {
    /// The whole list was replaced
    Replaced { items: Vec<Post>, has_more: bool },
    /// New posts were appended to the end of the list
    Appended { items: Vec<Post>, has_more: bool },
    /// A fetch started or finished
    LoadingChanged(bool),
}

/// Why a load request did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another fetch holds the request lock
    InFlight,
    /// The current query has no first page yet
    NotLoaded,
    /// The last page came back empty
    Exhausted,
}

/// Result of a load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Replaced { count: usize },
    Appended { added: usize },
    Skipped(SkipReason),
    /// The fetch failed; the feed is unchanged
    Failed(FeedError),
    /// The response belonged to an older filter or identity and was dropped
    Superseded,
    /// A reload was recorded and will run after the in-flight fetch
    Queued,
}

/// Read-only copy of the engine's state
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub items: Vec<Post>,
    pub filter: FilterState,
    pub has_more: bool,
    pub is_loading: bool,
}

struct FeedState {
    /// `page` is the last page merged into `items`
    filter: FilterState,
    items: Vec<Post>,
    seen: HashSet<PostId>,
    has_more: bool,
    epoch: u64,
    loaded_epoch: Option<u64>,
    /// Set until page 1 of `epoch` has been committed or has failed
    reload_pending: bool,
}

/// Held for the duration of a fetch. Publishes the loading flag.
struct InFlight<'a> {
    permit: Option<RequestPermit<'a>>,
    updates: &'a broadcast::Sender<FeedUpdate>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // Release first so observers of the update see the lock free
        self.permit.take();
        let _ = self.updates.send(FeedUpdate::LoadingChanged(false));
    }
}

/// Owns the filter and the accumulated feed.
pub struct FeedQueryEngine {
    source: Arc<dyn FeedDataSource>,
    notices: NoticeBus,
    lock: RequestLock,
    state: Mutex<FeedState>,
    updates: broadcast::Sender<FeedUpdate>,
}

impl FeedQueryEngine {
    pub fn new(source: Arc<dyn FeedDataSource>, notices: NoticeBus) -> Self {
        Self::with_filter(source, notices, FilterState::default(), DEFAULT_UPDATE_CAPACITY)
    }

    pub fn with_filter(
        source: Arc<dyn FeedDataSource>,
        notices: NoticeBus,
        filter: FilterState,
        update_capacity: usize,
    ) -> Self {
        let (updates, _) = broadcast::channel(update_capacity.max(1));
        Self {
            source,
            notices,
            lock: RequestLock::new(),
            state: Mutex::new(FeedState {
                filter: filter.with_page(1),
                items: Vec::new(),
                seen: HashSet::new(),
                has_more: true,
                epoch: 0,
                loaded_epoch: None,
                reload_pending: false,
            }),
            updates,
        }
    }

    /// Subscribe to feed changes
    pub fn subscribe(&self) -> broadcast::Receiver<FeedUpdate> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let state = self.state.lock();
        FeedSnapshot {
            items: state.items.clone(),
            filter: state.filter.clone(),
            has_more: state.has_more,
            is_loading: self.lock.is_locked(),
        }
    }

    pub fn items(&self) -> Vec<Post> {
        self.state.lock().items.clone()
    }

    pub fn filter(&self) -> FilterState {
        self.state.lock().filter.clone()
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().has_more
    }

    pub fn is_loading(&self) -> bool {
        self.lock.is_locked()
    }

    /// Merge `update` into the filter and reload from page 1.
    ///
    /// If a fetch is in flight the reload is queued behind it and
    /// [`LoadOutcome::Queued`] is returned; the in-flight response, being
    /// from an older epoch, is discarded.
    pub async fn set_filter(&self, update: FilterUpdate) -> LoadOutcome {
        let epoch = {
            let mut state = self.state.lock();
            state.filter = state.filter.apply(&update);
            state.epoch += 1;
            state.reload_pending = true;
            state.epoch
        };
        debug!(epoch, ?update, "Filter changed");

        self.drain_pending().await.unwrap_or(LoadOutcome::Queued)
    }

    /// Fetch page 1 of the current filter and replace the feed.
    ///
    /// Dropped if a fetch is already in flight.
    pub async fn reload(&self) -> LoadOutcome {
        let outcome = {
            let Some(_flight) = self.begin() else {
                debug!("Reload dropped, fetch in flight");
                return LoadOutcome::Skipped(SkipReason::InFlight);
            };
            let (query, epoch) = {
                let state = self.state.lock();
                (state.filter.with_page(1), state.epoch)
            };
            self.fetch_replace(query, epoch).await
        };

        self.drain_pending().await;
        outcome
    }

    /// Fetch the page after the last loaded one and append it.
    ///
    /// No-op while a fetch is in flight, before the current filter has a
    /// first page, or after an empty page. A reload left pending by a
    /// cancelled fetch runs first and its outcome is returned instead.
    pub async fn load_more(&self) -> LoadOutcome {
        let outcome = {
            let Some(_flight) = self.begin() else {
                debug!("Load more dropped, fetch in flight");
                return LoadOutcome::Skipped(SkipReason::InFlight);
            };
            match self.run_pending().await {
                Some(outcome) => outcome,
                None => self.fetch_next_page().await,
            }
        };

        self.drain_pending().await;
        outcome
    }

    /// Drop viewer-relative state after an identity change and reload.
    ///
    /// The visible posts lose their vote flags immediately; the reload
    /// brings back flags for the new identity.
    pub async fn invalidate_identity(&self) -> LoadOutcome {
        let (items, has_more, epoch) = {
            let mut state = self.state.lock();
            state.items = state.items.iter().map(Post::without_viewer_state).collect();
            state.epoch += 1;
            state.reload_pending = true;
            (state.items.clone(), state.has_more, state.epoch)
        };
        info!(epoch, "Identity changed, reloading feed");
        let _ = self.updates.send(FeedUpdate::Replaced { items, has_more });

        self.drain_pending().await.unwrap_or(LoadOutcome::Queued)
    }

    /// Reload whenever the signed-in identity changes.
    pub fn watch_session(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<SessionEvent>,
    ) -> Subscription {
        let engine = Arc::clone(self);
        Subscription::spawn("feed-session-watch", async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.changes_identity() => {
                        debug!(cause = ?event.cause, "Session changed");
                        engine.invalidate_identity().await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Session events lagged, reloading feed");
                        engine.invalidate_identity().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn begin(&self) -> Option<InFlight<'_>> {
        let permit = self.lock.try_acquire()?;
        let _ = self.updates.send(FeedUpdate::LoadingChanged(true));
        Some(InFlight {
            permit: Some(permit),
            updates: &self.updates,
        })
    }

    fn reload_pending(&self) -> bool {
        self.state.lock().reload_pending
    }

    /// Run queued reloads until none is left.
    ///
    /// Returns `None` when another task holds the lock; that task drains
    /// after releasing it.
    async fn drain_pending(&self) -> Option<LoadOutcome> {
        let mut last = None;
        while self.reload_pending() {
            let Some(_flight) = self.begin() else {
                return last;
            };
            if let Some(outcome) = self.run_pending().await {
                last = Some(outcome);
            }
        }
        last
    }

    /// Run queued reloads. The caller holds the lock.
    async fn run_pending(&self) -> Option<LoadOutcome> {
        let mut last = None;
        while let Some((query, epoch)) = self.pending_query() {
            last = Some(self.fetch_replace(query, epoch).await);
        }
        last
    }

    fn pending_query(&self) -> Option<(FilterState, u64)> {
        let state = self.state.lock();
        state
            .reload_pending
            .then(|| (state.filter.with_page(1), state.epoch))
    }

    async fn fetch_replace(&self, query: FilterState, epoch: u64) -> LoadOutcome {
        debug!(epoch, page = query.page(), "Fetching first page");

        let posts = match self.source.fetch_page(&query).await {
            Ok(posts) => posts,
            Err(e) => {
                let mut state = self.state.lock();
                if state.epoch == epoch {
                    state.reload_pending = false;
                }
                drop(state);
                return self.fetch_failed(e);
            }
        };

        let (items, has_more) = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                // The newer epoch's reload is still pending
                debug!(epoch, current = state.epoch, "Discarding stale page");
                return LoadOutcome::Superseded;
            }

            let has_more = !posts.is_empty();
            let mut seen = HashSet::with_capacity(posts.len());
            let items: Vec<Post> = posts
                .into_iter()
                .filter(|post| seen.insert(post.id.clone()))
                .collect();

            state.filter = query;
            state.items = items.clone();
            state.seen = seen;
            state.has_more = has_more;
            state.loaded_epoch = Some(epoch);
            state.reload_pending = false;
            (items, has_more)
        };

        let count = items.len();
        info!(epoch, count, has_more, "Feed replaced");
        let _ = self.updates.send(FeedUpdate::Replaced { items, has_more });
        LoadOutcome::Replaced { count }
    }

    async fn fetch_next_page(&self) -> LoadOutcome {
        let (query, epoch) = {
            let state = self.state.lock();
            if state.loaded_epoch != Some(state.epoch) {
                return LoadOutcome::Skipped(SkipReason::NotLoaded);
            }
            if !state.has_more {
                return LoadOutcome::Skipped(SkipReason::Exhausted);
            }
            let next = state.filter.page().saturating_add(1);
            (state.filter.with_page(next), state.epoch)
        };
        debug!(epoch, page = query.page(), "Fetching next page");

        let posts = match self.source.fetch_page(&query).await {
            Ok(posts) => posts,
            Err(e) => return self.fetch_failed(e),
        };

        let (added, has_more) = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                debug!(epoch, current = state.epoch, "Discarding stale page");
                return LoadOutcome::Superseded;
            }

            let has_more = !posts.is_empty();
            let mut added = Vec::with_capacity(posts.len());
            for post in posts {
                if state.seen.insert(post.id.clone()) {
                    added.push(post);
                }
            }

            state.items.extend(added.iter().cloned());
            state.filter = query;
            state.has_more = has_more;
            (added, has_more)
        };

        let count = added.len();
        info!(epoch, added = count, has_more, "Feed page appended");
        let _ = self.updates.send(FeedUpdate::Appended {
            items: added,
            has_more,
        });
        LoadOutcome::Appended { added: count }
    }

    fn fetch_failed(&self, error: FeedError) -> LoadOutcome {
        warn!(error = %error, "Feed fetch failed");
        self.notices.error(FETCH_FAILED_NOTICE);
        LoadOutcome::Failed(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    struct PagedSource {
        pages: Mutex<Vec<Vec<Post>>>,
    }

    #[async_trait]
    impl FeedDataSource for PagedSource {
        async fn fetch_page(&self, query: &FilterState) -> Result<Vec<Post>, FeedError> {
            let pages = self.pages.lock();
            Ok(pages
                .get(query.page() as usize - 1)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn post(id: &str) -> Post {
        Post {
            id: PostId::new(id),
            author_address: "0xauthor".into(),
            topic_label: "general".into(),
            caption_text: id.into(),
            created_at: Utc::now(),
            upvote_count: 0,
            viewer_has_upvoted: true,
            viewer_has_downvoted: false,
            media: None,
        }
    }

    fn engine(pages: Vec<Vec<Post>>) -> FeedQueryEngine {
        FeedQueryEngine::new(
            Arc::new(PagedSource {
                pages: Mutex::new(pages),
            }),
            NoticeBus::default(),
        )
    }

    #[tokio::test]
    async fn test_load_more_before_reload_is_noop() {
        let engine = engine(vec![vec![post("a")]]);
        assert_eq!(
            engine.load_more().await,
            LoadOutcome::Skipped(SkipReason::NotLoaded)
        );
        assert!(engine.items().is_empty());
    }

    #[tokio::test]
    async fn test_reload_then_load_more_dedupes() {
        let engine = engine(vec![vec![post("a"), post("b")], vec![post("b"), post("c")]]);

        assert_eq!(engine.reload().await, LoadOutcome::Replaced { count: 2 });
        assert_eq!(engine.load_more().await, LoadOutcome::Appended { added: 1 });

        let ids: Vec<String> = engine.items().iter().map(|p| p.id.to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(engine.filter().page(), 2);
        assert!(engine.has_more());
    }

    #[tokio::test]
    async fn test_duplicate_ids_within_first_page_are_dropped() {
        let engine = engine(vec![vec![post("a"), post("a"), post("b")]]);
        assert_eq!(engine.reload().await, LoadOutcome::Replaced { count: 2 });
    }

    #[tokio::test]
    async fn test_invalidate_identity_scrubs_then_reloads() {
        let engine = engine(vec![vec![post("a")]]);
        engine.reload().await;
        let mut updates = engine.subscribe();

        engine.invalidate_identity().await;

        match updates.recv().await.unwrap() {
            FeedUpdate::Replaced { items, .. } => {
                assert!(items.iter().all(|p| !p.viewer_has_upvoted));
            }
            other => panic!("unexpected update: {:?}", other),
        }
        assert!(!engine.is_loading());
    }

    #[tokio::test]
    async fn test_lock_is_free_when_loading_ends() {
        let engine = Arc::new(engine(vec![vec![post("a")]]));
        let mut updates = engine.subscribe();

        let observer = {
            let engine = engine.clone();
            tokio::spawn(async move {
                while let Ok(update) = updates.recv().await {
                    if update == FeedUpdate::LoadingChanged(false) {
                        return engine.is_loading();
                    }
                }
                true
            })
        };

        engine.reload().await;
        assert!(!observer.await.unwrap());
    }

    #[tokio::test]
    async fn test_loading_flag_is_published() {
        let engine = engine(vec![vec![post("a")]]);
        let mut updates = engine.subscribe();

        engine.reload().await;

        assert_eq!(updates.recv().await.unwrap(), FeedUpdate::LoadingChanged(true));
        assert!(matches!(
            updates.recv().await.unwrap(),
            FeedUpdate::Replaced { .. }
        ));
        assert_eq!(updates.recv().await.unwrap(), FeedUpdate::LoadingChanged(false));
    }
}
