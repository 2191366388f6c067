//! Presentation-facing facade.
//!
//! [`BitcastClient`] wires the session manager, the feed engine and the
//! scroll observer together and exposes the small surface a view needs.
//! Views read snapshots and call operations; they never reach into engine
//! state directly.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::auth::{AuthSessionManager, AuthState, AuthVerifier, HttpAuthVerifier, SessionEvent};
use crate::config::ClientConfig;
use crate::error::{AuthResult, ClientError};
use crate::feed::{
    FeedDataSource, FeedQueryEngine, FeedSnapshot, FeedUpdate, FilterState, FilterUpdate,
    HttpFeedSource, LoadOutcome,
};
use crate::notice::{Notice, NoticeBus};
use crate::scroll::{self, ScrollHandle, ScrollMetrics};
use crate::storage::{RedbSessionStore, SessionStore};
use crate::subscription::Subscription;
use crate::types::{Post, Session};
use crate::wallet::WalletCapability;

/// The client core as a view sees it.
pub struct BitcastClient {
    config: ClientConfig,
    notices: NoticeBus,
    auth: Arc<AuthSessionManager>,
    feed: Arc<FeedQueryEngine>,
    scroll: Mutex<Option<ScrollHandle>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl BitcastClient {
    /// Assemble a client from explicit collaborators.
    pub fn new(
        config: ClientConfig,
        wallet: Arc<dyn WalletCapability>,
        verifier: Arc<dyn AuthVerifier>,
        source: Arc<dyn FeedDataSource>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let notices = NoticeBus::default();

        let auth = AuthSessionManager::new(wallet, verifier, store, notices.clone())
            .with_challenge(config.challenge.clone())
            .with_event_capacity(config.event_capacity);

        let feed = FeedQueryEngine::with_filter(
            source,
            notices.clone(),
            FilterState::new(config.page_size),
            config.event_capacity,
        );

        Self {
            config,
            notices,
            auth: Arc::new(auth),
            feed: Arc::new(feed),
            scroll: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Client talking to the configured HTTP API, with the session stored
    /// under the configured data directory.
    pub fn from_config(
        config: ClientConfig,
        wallet: Arc<dyn WalletCapability>,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let store: Arc<dyn SessionStore> =
            Arc::new(RedbSessionStore::new(config.session_db_path())?);
        let verifier = Arc::new(HttpAuthVerifier::new(
            config.auth_endpoint(),
            config.request_timeout(),
        )?);
        let source = Arc::new(HttpFeedSource::new(
            config.posts_endpoint(),
            Arc::clone(&store),
            config.request_timeout(),
        )?);

        Ok(Self::new(config, wallet, verifier, source, store))
    }

    /// Restore the stored session and attach every listener.
    ///
    /// Calling it again replaces the previous listeners.
    pub fn start(&self) -> Option<Session> {
        self.detach();

        let restored = self.auth.restore();

        // Feed watches session events before the wallet listener can emit any
        let session_watch = self.feed.watch_session(self.auth.subscribe());
        let wallet_listener = self.auth.attach();
        let (handle, scroll_observer) =
            scroll::attach(Arc::clone(&self.feed), self.config.scroll_threshold_px);

        *self.scroll.lock() = Some(handle);
        self.subscriptions
            .lock()
            .extend([session_watch, wallet_listener, scroll_observer]);

        info!(signed_in = restored.is_some(), "Client started");
        restored
    }

    /// Drop every listener. Nothing fires afterwards.
    pub fn detach(&self) {
        self.scroll.lock().take();
        let subscriptions: Vec<Subscription> = self.subscriptions.lock().drain(..).collect();
        if !subscriptions.is_empty() {
            debug!(count = subscriptions.len(), "Detaching client listeners");
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &Arc<AuthSessionManager> {
        &self.auth
    }

    pub fn feed(&self) -> &Arc<FeedQueryEngine> {
        &self.feed
    }

    pub fn current_user(&self) -> Option<Session> {
        self.auth.current_user()
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    pub async fn sign_in(&self) -> AuthResult<Session> {
        self.auth.sign_in().await
    }

    pub fn sign_out(&self) {
        self.auth.sign_out();
    }

    /// Drop the session if the wallet moved to another account meanwhile.
    pub async fn reconcile(&self) -> bool {
        self.auth.reconcile().await
    }

    pub fn feed_items(&self) -> Vec<Post> {
        self.feed.items()
    }

    pub fn feed_snapshot(&self) -> FeedSnapshot {
        self.feed.snapshot()
    }

    pub fn is_loading(&self) -> bool {
        self.feed.is_loading()
    }

    pub fn has_more(&self) -> bool {
        self.feed.has_more()
    }

    pub fn filter(&self) -> FilterState {
        self.feed.filter()
    }

    pub async fn set_filter(&self, update: FilterUpdate) -> LoadOutcome {
        self.feed.set_filter(update).await
    }

    pub async fn reload(&self) -> LoadOutcome {
        self.feed.reload().await
    }

    pub async fn load_more(&self) -> LoadOutcome {
        self.feed.load_more().await
    }

    /// Report a scroll position. Returns `false` when not started or detached.
    pub fn notify_on_scroll(&self, metrics: ScrollMetrics) -> bool {
        self.scroll
            .lock()
            .as_ref()
            .is_some_and(|handle| handle.notify_on_scroll(metrics))
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn subscribe_feed(&self) -> broadcast::Receiver<FeedUpdate> {
        self.feed.subscribe()
    }

    pub fn subscribe_session(&self) -> broadcast::Receiver<SessionEvent> {
        self.auth.subscribe()
    }
}
