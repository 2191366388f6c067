//! Error types for the Bitcast client core

use thiserror::Error;

use crate::auth::TransitionCause;

/// Failures of a sign-in attempt.
///
/// Every variant is recoverable: the session manager rolls back to its
/// last stable state and the caller may retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No wallet provider could be reached, or it exposed no account
    #[error("Wallet unavailable: {0}")]
    WalletUnavailable(String),

    /// The human declined the signature request
    #[error("Signature request was rejected")]
    SignatureRejected,

    /// Provider-side fault while obtaining the signer or signature
    #[error("Wallet error: {0}")]
    WalletError(String),

    /// The verification endpoint did not return a usable session
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// Another sign-in attempt is still authenticating
    #[error("Sign-in already in progress")]
    AlreadyInProgress,

    /// The session was cleared while the attempt was authenticating
    #[error("Sign-in interrupted: {0:?}")]
    Interrupted(TransitionCause),

    /// The session could not be persisted
    #[error("Session store error: {0}")]
    SessionStore(String),
}

/// Failures while loading feed pages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Network or server fault during a page load
    #[error("Feed fetch failed: {0}")]
    FetchFailed(String),
}

/// Errors raised by the persistent session store (redb).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error during serialization of the session record
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::SessionStore(err.to_string())
    }
}

/// Invalid client configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid API base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Page size must be greater than zero")]
    ZeroPageSize,

    #[error("Scroll threshold must be positive (got {0})")]
    InvalidScrollThreshold(f64),

    #[error("Event channel capacity must be greater than zero")]
    ZeroEventCapacity,
}

/// Failures while assembling a client from configuration.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Feed(#[from] FeedError),
}

/// Result type alias for sign-in operations
pub type AuthResult<T> = Result<T, AuthError>;
