//! Wallet capability: the user's key holder and signer.
//!
//! The client never reaches a wallet through ambient state. A
//! [`WalletCapability`] is handed to the
//! [`AuthSessionManager`](crate::auth::AuthSessionManager) at construction,
//! so tests and the CLI can substitute their own.

pub mod local;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

pub use local::LocalKeyWallet;

/// `reason` value a wallet reports when the human declines a request
pub const REJECTED_REASON: &str = "rejected";

/// Failure reported by a wallet provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletFailure {
    /// No provider could be reached
    #[error("wallet unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with an error object
    #[error("{message}")]
    Provider {
        reason: Option<String>,
        message: String,
    },
}

impl WalletFailure {
    /// The human declined the request.
    pub fn rejected() -> Self {
        WalletFailure::Provider {
            reason: Some(REJECTED_REASON.to_string()),
            message: "user rejected the request".to_string(),
        }
    }

    /// Any other provider-side fault.
    pub fn provider(message: impl Into<String>) -> Self {
        WalletFailure::Provider {
            reason: None,
            message: message.into(),
        }
    }

    /// Whether this is exactly the human-rejection signal.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            WalletFailure::Provider { reason: Some(reason), .. } if reason == REJECTED_REASON
        )
    }
}

/// Events pushed by the wallet provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// The active account list changed; the first entry is the active one
    AccountsChanged(Vec<String>),
    Connected,
    Disconnected,
}

impl WalletEvent {
    /// Active address carried by an `AccountsChanged` event, if non-empty.
    pub fn active_address(&self) -> Option<&str> {
        match self {
            WalletEvent::AccountsChanged(accounts) => accounts
                .first()
                .map(String::as_str)
                .filter(|address| !address.is_empty()),
            _ => None,
        }
    }
}

/// Signs messages with the key of one address.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> &str;

    /// Ask the wallet to sign `message`. May wait on a human indefinitely.
    async fn sign_message(&self, message: &str) -> Result<String, WalletFailure>;
}

/// Provider-agnostic access to a wallet.
#[async_trait]
pub trait WalletCapability: Send + Sync {
    /// Ask for account access; returns the exposed addresses, active first.
    async fn request_accounts(&self) -> Result<Vec<String>, WalletFailure>;

    /// Currently active address without prompting, if any.
    async fn current_address(&self) -> Result<Option<String>, WalletFailure>;

    /// Signer for the active account.
    async fn signer(&self) -> Result<Box<dyn WalletSigner>, WalletFailure>;

    /// Stream of provider events.
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}
