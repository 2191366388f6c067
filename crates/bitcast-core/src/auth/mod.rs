//! Wallet-signature sign-in and session lifecycle.
//!
//! The [`AuthSessionManager`] is the only writer of the
//! [`SessionStore`](crate::storage::SessionStore) and owns the in-memory
//! current session. It runs a three-state machine:
//!
//! ```text
//! SignedOut --sign_in--> Authenticating --verified--> SignedIn
//!     ^                        |                          |
//!     +-------- failure -------+                          |
//!     +------ sign_out / account change / disconnect -----+
//! ```
//!
//! Every transition is published as a [`SessionEvent`] so the feed (and
//! any UI) can react to identity changes.

pub mod verifier;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub use verifier::{AuthVerifier, HttpAuthVerifier, VerificationRequest};

use crate::error::{AuthError, AuthResult};
use crate::notice::NoticeBus;
use crate::storage::SessionStore;
use crate::subscription::Subscription;
use crate::types::{shorten_address, Session};
use crate::wallet::{WalletCapability, WalletEvent, WalletFailure};

/// Fixed text the wallet is asked to sign.
///
/// Not a nonce: a captured signature stays valid for as long as the server
/// accepts it.
pub const SIGN_IN_CHALLENGE: &str = "Sign into Bitcast App";

const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    Authenticating,
    SignedIn,
}

/// What caused a [`SessionEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCause {
    /// A stored session was loaded at startup
    Restored,
    SignInStarted,
    SignInSucceeded,
    SignInFailed,
    /// Explicit sign-out
    SignedOut,
    /// The wallet switched to another account
    AccountChanged,
    /// The wallet disconnected
    Disconnected,
    /// The wallet's active address no longer matches the session
    AddressMismatch,
}

/// A state transition of the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub from: AuthState,
    pub to: AuthState,
    pub cause: TransitionCause,
    /// Current session after the transition
    pub session: Option<Session>,
}

impl SessionEvent {
    /// Whether the identity the app acts as may have changed.
    ///
    /// Starting or failing a sign-in leaves the identity as it was.
    pub fn changes_identity(&self) -> bool {
        !matches!(
            self.cause,
            TransitionCause::SignInStarted | TransitionCause::SignInFailed
        )
    }
}

struct AuthInner {
    state: AuthState,
    current: Option<Session>,
    /// Bumped whenever the session is cleared. A sign-in attempt that
    /// started under an older generation may not commit.
    generation: u64,
    /// Why the session was last cleared
    last_clear: Option<TransitionCause>,
}

/// Orchestrates sign-in and owns the current session.
pub struct AuthSessionManager {
    wallet: Arc<dyn WalletCapability>,
    verifier: Arc<dyn AuthVerifier>,
    store: Arc<dyn SessionStore>,
    notices: NoticeBus,
    challenge: String,
    inner: Mutex<AuthInner>,
    events: broadcast::Sender<SessionEvent>,
}

impl AuthSessionManager {
    pub fn new(
        wallet: Arc<dyn WalletCapability>,
        verifier: Arc<dyn AuthVerifier>,
        store: Arc<dyn SessionStore>,
        notices: NoticeBus,
    ) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            wallet,
            verifier,
            store,
            notices,
            challenge: SIGN_IN_CHALLENGE.to_string(),
            inner: Mutex::new(AuthInner {
                state: AuthState::SignedOut,
                current: None,
                generation: 0,
                last_clear: None,
            }),
            events,
        }
    }

    /// Use a different challenge text.
    pub fn with_challenge(mut self, challenge: impl Into<String>) -> Self {
        self.challenge = challenge.into();
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        self.events = events;
        self
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn state(&self) -> AuthState {
        self.inner.lock().state
    }

    pub fn current_user(&self) -> Option<Session> {
        self.inner.lock().current.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Load the stored session, if any, and make it current.
    ///
    /// The stored signature is not re-verified. A session already held in
    /// memory, or a sign-in in progress, takes precedence over the store.
    pub fn restore(&self) -> Option<Session> {
        let stored = match self.store.get() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to read session store");
                None
            }
        };
        let session = stored?;

        let event = {
            let mut inner = self.inner.lock();
            if inner.state != AuthState::SignedOut {
                return inner.current.clone();
            }
            inner.state = AuthState::SignedIn;
            inner.current = Some(session.clone());
            SessionEvent {
                from: AuthState::SignedOut,
                to: AuthState::SignedIn,
                cause: TransitionCause::Restored,
                session: Some(session.clone()),
            }
        };

        info!(address = %session.identity_address, "Session restored");
        self.emit(event);
        Some(session)
    }

    /// Sign the challenge with the wallet and exchange it for a session.
    ///
    /// Fails fast with [`AuthError::AlreadyInProgress`] while another
    /// attempt is authenticating. On failure the state reverts and the
    /// store is left untouched. Every outcome also produces a notice.
    pub async fn sign_in(&self) -> AuthResult<Session> {
        let mut attempt = match self.begin_attempt() {
            Ok(attempt) => attempt,
            Err(e) => {
                debug!("Sign-in requested while another is authenticating");
                self.notices.error(failure_notice(&e));
                return Err(e);
            }
        };

        let outcome = match self.authenticate().await {
            Ok(session) => self.commit(&mut attempt, session),
            Err(e) => Err(e),
        };
        drop(attempt);

        match &outcome {
            Ok(session) => {
                info!(address = %session.identity_address, "Signed in");
                self.notices.success("Signed in");
            }
            Err(e) => {
                warn!(error = %e, "Sign-in failed");
                self.notices.error(failure_notice(e));
            }
        }
        outcome
    }

    /// Forget the current session. Idempotent.
    pub fn sign_out(&self) {
        let had_session = self.inner.lock().current.is_some();
        let event = self.clear_session(TransitionCause::SignedOut);
        if had_session || event.from != event.to {
            info!("Signed out");
            self.emit(event);
        }
    }

    /// React to a wallet provider event.
    pub fn on_wallet_event(&self, event: &WalletEvent) {
        debug!(?event, "Wallet event");
        match event {
            WalletEvent::AccountsChanged(_) => {
                let cleared = self.clear_session(TransitionCause::AccountChanged);
                self.emit(cleared);
                if let Some(address) = event.active_address() {
                    self.notices
                        .info(format!("Account switched to {}", shorten_address(address)));
                }
            }
            WalletEvent::Connected => {
                self.notices.info("Account connected");
            }
            WalletEvent::Disconnected => {
                let cleared = self.clear_session(TransitionCause::Disconnected);
                self.emit(cleared);
                self.notices.info("Wallet disconnected");
            }
        }
    }

    /// Check the current session against the wallet's active address.
    ///
    /// Clears the session when the wallet reports another address or no
    /// address. A wallet that cannot be queried leaves the session alone.
    /// Returns whether a session remains.
    pub async fn reconcile(&self) -> bool {
        let Some(session) = self.current_user() else {
            return false;
        };

        match self.wallet.current_address().await {
            Ok(Some(address)) if session.matches_address(&address) => true,
            Ok(active) => {
                info!(
                    session = %session.identity_address,
                    active = ?active,
                    "Session does not match wallet, clearing"
                );
                self.clear_if_current(&session, TransitionCause::AddressMismatch);
                self.current_user().is_some()
            }
            Err(e) => {
                warn!(error = %e, "Could not query wallet address, keeping session");
                true
            }
        }
    }

    /// Listen to the wallet's event stream until the subscription drops.
    pub fn attach(self: &Arc<Self>) -> Subscription {
        let manager = Arc::clone(self);
        let mut events = self.wallet.subscribe();
        Subscription::spawn("auth-wallet-events", async move {
            loop {
                match events.recv().await {
                    Ok(event) => manager.on_wallet_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Wallet events lagged, reconciling session");
                        manager.reconcile().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn begin_attempt(&self) -> AuthResult<Attempt<'_>> {
        let (event, generation) = {
            let mut inner = self.inner.lock();
            if inner.state == AuthState::Authenticating {
                return Err(AuthError::AlreadyInProgress);
            }
            let from = inner.state;
            inner.state = AuthState::Authenticating;
            (
                SessionEvent {
                    from,
                    to: AuthState::Authenticating,
                    cause: TransitionCause::SignInStarted,
                    session: inner.current.clone(),
                },
                inner.generation,
            )
        };
        self.emit(event);
        Ok(Attempt {
            manager: self,
            generation,
            committed: false,
        })
    }

    async fn authenticate(&self) -> AuthResult<Session> {
        let accounts = self
            .wallet
            .request_accounts()
            .await
            .map_err(classify_wallet_failure)?;
        if accounts.first().map_or(true, |a| a.is_empty()) {
            return Err(AuthError::WalletUnavailable(
                "wallet exposed no account".to_string(),
            ));
        }

        let signer = self
            .wallet
            .signer()
            .await
            .map_err(classify_wallet_failure)?;
        let signer_address = signer.address().to_string();
        debug!(signer = %signer_address, "Requesting signature");

        let signature = signer
            .sign_message(&self.challenge)
            .await
            .map_err(classify_wallet_failure)?;

        let request = VerificationRequest {
            message: self.challenge.clone(),
            signature,
            signer_address: signer_address.clone(),
        };
        let mut session = self
            .verifier
            .verify(&request)
            .await?
            .ok_or_else(|| AuthError::VerificationFailed("no session issued".to_string()))?;

        if session.access_token.is_empty() {
            return Err(AuthError::VerificationFailed(
                "session has no access token".to_string(),
            ));
        }
        if session.identity_address.is_empty() {
            session.identity_address = signer_address;
        } else if !session.matches_address(&signer_address) {
            return Err(AuthError::VerificationFailed(format!(
                "session issued for {}, signed by {}",
                session.identity_address, signer_address
            )));
        }

        Ok(session)
    }

    fn commit(&self, attempt: &mut Attempt<'_>, session: Session) -> AuthResult<Session> {
        let event = {
            let mut inner = self.inner.lock();
            if inner.generation != attempt.generation {
                let cause = inner.last_clear.unwrap_or(TransitionCause::SignedOut);
                return Err(AuthError::Interrupted(cause));
            }
            self.store.set(&session)?;
            let from = inner.state;
            inner.state = AuthState::SignedIn;
            inner.current = Some(session.clone());
            attempt.committed = true;
            SessionEvent {
                from,
                to: AuthState::SignedIn,
                cause: TransitionCause::SignInSucceeded,
                session: Some(session.clone()),
            }
        };
        self.emit(event);
        Ok(session)
    }

    /// Revert an uncommitted attempt to the last stable state.
    fn abandon_attempt(&self) {
        let event = {
            let mut inner = self.inner.lock();
            if inner.state != AuthState::Authenticating {
                return;
            }
            inner.state = if inner.current.is_some() {
                AuthState::SignedIn
            } else {
                AuthState::SignedOut
            };
            SessionEvent {
                from: AuthState::Authenticating,
                to: inner.state,
                cause: TransitionCause::SignInFailed,
                session: inner.current.clone(),
            }
        };
        self.emit(event);
    }

    /// Drop the session from memory and the store.
    ///
    /// An attempt in progress keeps its `Authenticating` state but can no
    /// longer commit.
    fn clear_session(&self, cause: TransitionCause) -> SessionEvent {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.last_clear = Some(cause);
        inner.current = None;
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
        let from = inner.state;
        if from == AuthState::SignedIn {
            inner.state = AuthState::SignedOut;
        }
        SessionEvent {
            from,
            to: inner.state,
            cause,
            session: None,
        }
    }

    fn clear_if_current(&self, expected: &Session, cause: TransitionCause) {
        if self.inner.lock().current.as_ref() != Some(expected) {
            return;
        }
        let event = self.clear_session(cause);
        self.emit(event);
    }

    fn emit(&self, event: SessionEvent) {
        debug!(from = ?event.from, to = ?event.to, cause = ?event.cause, "Session transition");
        let _ = self.events.send(event);
    }
}

/// In-progress sign-in. Reverts the state machine on drop unless committed,
/// which covers errors and a cancelled `sign_in` future alike.
struct Attempt<'a> {
    manager: &'a AuthSessionManager,
    generation: u64,
    committed: bool,
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.manager.abandon_attempt();
        }
    }
}

fn classify_wallet_failure(failure: WalletFailure) -> AuthError {
    if failure.is_rejection() {
        return AuthError::SignatureRejected;
    }
    match failure {
        WalletFailure::Unavailable(reason) => AuthError::WalletUnavailable(reason),
        WalletFailure::Provider { message, .. } => AuthError::WalletError(message),
    }
}

/// User-facing text for a failed sign-in
pub fn failure_notice(error: &AuthError) -> &'static str {
    match error {
        AuthError::SignatureRejected => "Signature request was rejected",
        AuthError::VerificationFailed(_) => "Sign-in was unsuccessful",
        AuthError::WalletUnavailable(_) => "No wallet available",
        AuthError::AlreadyInProgress => "Sign-in already in progress",
        AuthError::Interrupted(TransitionCause::SignedOut) => "Signed out before sign-in finished",
        AuthError::Interrupted(TransitionCause::AccountChanged) => "Account changed during sign-in",
        AuthError::Interrupted(TransitionCause::Disconnected) => {
            "Wallet disconnected during sign-in"
        }
        AuthError::Interrupted(_) => "Sign-in was interrupted",
        AuthError::WalletError(_) | AuthError::SessionStore(_) => "Something went wrong",
    }
}
