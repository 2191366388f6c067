//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bitcast_core::{
    AuthError, AuthVerifier, FeedDataSource, FeedError, FilterState, NoticeBus, Post, PostId,
    Session, VerificationRequest, WalletCapability, WalletEvent, WalletFailure, WalletSigner,
};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};

pub const ALICE: &str = "0xa11ce00000000000000000000000000000000001";
pub const BOB: &str = "0xb0b0000000000000000000000000000000000002";

// ============================================================================
// Wallet
// ============================================================================

/// How the scripted signer answers a signature request
#[derive(Debug, Clone)]
pub enum SignBehavior {
    Sign,
    Fail(WalletFailure),
}

struct WalletScript {
    accounts: Result<Vec<String>, WalletFailure>,
    current: Option<String>,
    sign: SignBehavior,
    gate: Option<oneshot::Receiver<()>>,
}

/// Wallet whose answers are set by the test.
pub struct ScriptedWallet {
    script: Arc<Mutex<WalletScript>>,
    events: broadcast::Sender<WalletEvent>,
    sign_requests: Arc<AtomicUsize>,
}

impl ScriptedWallet {
    pub fn with_account(address: &str) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            script: Arc::new(Mutex::new(WalletScript {
                accounts: Ok(vec![address.to_string()]),
                current: Some(address.to_string()),
                sign: SignBehavior::Sign,
                gate: None,
            })),
            events,
            sign_requests: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        let wallet = Self::with_account(ALICE);
        {
            let mut script = wallet.script.lock();
            script.accounts = Err(WalletFailure::Unavailable("no provider".into()));
            script.current = None;
        }
        wallet
    }

    pub fn set_sign_behavior(&self, behavior: SignBehavior) {
        self.script.lock().sign = behavior;
    }

    /// Hold the next signature request until the returned sender fires.
    pub fn hold_next_signature(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().gate = Some(rx);
        tx
    }

    /// Switch the active account without emitting an event.
    pub fn set_active(&self, address: Option<&str>) {
        let mut script = self.script.lock();
        script.current = address.map(str::to_string);
        script.accounts = Ok(address.map(str::to_string).into_iter().collect());
    }

    pub fn emit(&self, event: WalletEvent) {
        let _ = self.events.send(event);
    }

    pub fn sign_requests(&self) -> usize {
        self.sign_requests.load(Ordering::SeqCst)
    }
}

pub struct ScriptedSigner {
    address: String,
    script: Arc<Mutex<WalletScript>>,
    sign_requests: Arc<AtomicUsize>,
}

#[async_trait]
impl WalletSigner for ScriptedSigner {
    fn address(&self) -> &str {
        &self.address
    }

    async fn sign_message(&self, message: &str) -> Result<String, WalletFailure> {
        self.sign_requests.fetch_add(1, Ordering::SeqCst);
        let gate = self.script.lock().gate.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let behavior = self.script.lock().sign.clone();
        match behavior {
            SignBehavior::Sign => Ok(format!("0xsig:{}:{}", self.address, message.len())),
            SignBehavior::Fail(failure) => Err(failure),
        }
    }
}

#[async_trait]
impl WalletCapability for ScriptedWallet {
    async fn request_accounts(&self) -> Result<Vec<String>, WalletFailure> {
        self.script.lock().accounts.clone()
    }

    async fn current_address(&self) -> Result<Option<String>, WalletFailure> {
        Ok(self.script.lock().current.clone())
    }

    async fn signer(&self) -> Result<Box<dyn WalletSigner>, WalletFailure> {
        let address = self
            .script
            .lock()
            .current
            .clone()
            .ok_or_else(|| WalletFailure::Unavailable("no account".into()))?;
        Ok(Box::new(ScriptedSigner {
            address,
            script: Arc::clone(&self.script),
            sign_requests: Arc::clone(&self.sign_requests),
        }))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// Verifier
// ============================================================================

#[derive(Debug, Clone)]
pub enum VerifyBehavior {
    /// Issue a session for the signer with this token
    Issue(String),
    /// Answer `{ data: null }`
    NoSession,
    /// Issue a session for a different address
    IssueFor(String),
    Fail(AuthError),
}

pub struct MockVerifier {
    behavior: Mutex<VerifyBehavior>,
    requests: Mutex<Vec<VerificationRequest>>,
}

impl MockVerifier {
    pub fn issuing(token: &str) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(VerifyBehavior::Issue(token.to_string())),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn set_behavior(&self, behavior: VerifyBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn requests(&self) -> Vec<VerificationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AuthVerifier for MockVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<Option<Session>, AuthError> {
        self.requests.lock().push(request.clone());
        let behavior = self.behavior.lock().clone();
        match behavior {
            VerifyBehavior::Issue(token) => {
                Ok(Some(Session::new(request.signer_address.clone(), token)))
            }
            VerifyBehavior::NoSession => Ok(None),
            VerifyBehavior::IssueFor(address) => Ok(Some(Session::new(address, "token"))),
            VerifyBehavior::Fail(error) => Err(error),
        }
    }
}

// ============================================================================
// Feed source
// ============================================================================

type Responder = Box<dyn Fn(&FilterState) -> Result<Vec<Post>, FeedError> + Send + Sync>;

/// Feed source that records every query and answers through a closure.
pub struct MockFeedSource {
    responder: Mutex<Responder>,
    calls: Mutex<Vec<FilterState>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockFeedSource {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&FilterState) -> Result<Vec<Post>, FeedError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Mutex::new(Box::new(responder)),
            calls: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        })
    }

    /// Every query gets a full page of ids unique to its filter and page.
    pub fn full_pages() -> Arc<Self> {
        Self::new(|query| Ok(page_for(query, query.page_size() as usize)))
    }

    /// Serve `pages` in order by page number, then empty pages.
    pub fn paged(pages: Vec<Vec<Post>>) -> Arc<Self> {
        Self::new(move |query| {
            Ok(pages
                .get(query.page() as usize - 1)
                .cloned()
                .unwrap_or_default())
        })
    }

    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&FilterState) -> Result<Vec<Post>, FeedError> + Send + Sync + 'static,
    {
        *self.responder.lock() = Box::new(responder);
    }

    /// Hold the next fetch until the returned sender fires.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock() = Some(rx);
        tx
    }

    pub fn calls(&self) -> Vec<FilterState> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl FeedDataSource for MockFeedSource {
    async fn fetch_page(&self, query: &FilterState) -> Result<Vec<Post>, FeedError> {
        self.calls.lock().push(query.clone());
        let gate = self.gate.lock().take();
        match gate {
            Some(gate) => {
                let _ = gate.await;
            }
            None => tokio::task::yield_now().await,
        }
        let responder = self.responder.lock();
        (*responder)(query)
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn post(id: &str) -> Post {
    Post {
        id: PostId::new(id),
        author_address: ALICE.to_string(),
        topic_label: "general".to_string(),
        caption_text: format!("caption {}", id),
        created_at: Utc::now(),
        upvote_count: 1,
        viewer_has_upvoted: true,
        viewer_has_downvoted: false,
        media: None,
    }
}

pub fn posts(prefix: &str, count: usize) -> Vec<Post> {
    (0..count).map(|i| post(&format!("{}-{}", prefix, i))).collect()
}

/// A page of posts whose ids encode the query that produced them.
pub fn page_for(query: &FilterState, count: usize) -> Vec<Post> {
    let since = query.since_window().map_or("all", |w| w.as_query());
    let prefix = format!(
        "{}-{}-p{}",
        query.sort_key().as_query(),
        since,
        query.page()
    );
    posts(&prefix, count)
}

pub fn notices() -> NoticeBus {
    NoticeBus::new(64)
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_secs(2) {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
