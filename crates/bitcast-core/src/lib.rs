//! Bitcast Client Core
//!
//! Wallet-signature sign-in and a paginated, filterable post feed.
//!
//! ## Overview
//!
//! A user proves control of a wallet address by signing a fixed challenge.
//! The server exchanges the signature for a session, which is persisted and
//! restored on the next start. The feed is fetched page by page; each fetch
//! carries the session's token so vote flags are personalized, and every
//! identity change reloads the feed so those flags never leak across users.
//!
//! ## Components
//!
//! - **storage**: durable holder for the one session record (redb)
//! - **wallet**: the wallet capability seam, plus an in-process key wallet
//! - **auth**: the session state machine and the verification endpoint
//! - **feed**: filter state, single-flight page loading, deduplication
//! - **scroll**: scroll position to "next page" signals
//! - **client**: the facade a view talks to
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use bitcast_core::{BitcastClient, ClientConfig, FilterUpdate, LocalKeyWallet, SortKey};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let wallet = Arc::new(LocalKeyWallet::generate());
//!     let client = BitcastClient::from_config(ClientConfig::default(), wallet)?;
//!
//!     client.start();
//!     client.sign_in().await?;
//!     client.set_filter(FilterUpdate::new().sort(SortKey::Top)).await;
//!
//!     for post in client.feed_items() {
//!         println!("{}: {}", post.author_address, post.caption_text);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod notice;
pub mod scroll;
pub mod storage;
pub mod subscription;
pub mod types;
pub mod wallet;

// Re-exports
pub use auth::{
    AuthSessionManager, AuthState, AuthVerifier, HttpAuthVerifier, SessionEvent,
    TransitionCause, VerificationRequest, SIGN_IN_CHALLENGE,
};
pub use client::BitcastClient;
pub use config::ClientConfig;
pub use error::{AuthError, AuthResult, ClientError, ConfigError, FeedError, StoreError};
pub use feed::{
    FeedDataSource, FeedQueryEngine, FeedSnapshot, FeedUpdate, FilterState, FilterUpdate,
    HttpFeedSource, LoadOutcome, SinceWindow, SkipReason, SortDirection, SortKey,
};
pub use notice::{Notice, NoticeBus, NoticeLevel};
pub use scroll::{ScrollHandle, ScrollMetrics, ScrollTrigger};
pub use storage::{MemorySessionStore, RedbSessionStore, SessionStore};
pub use subscription::Subscription;
pub use types::{shorten_address, MediaRef, Post, PostId, Session};
pub use wallet::{LocalKeyWallet, WalletCapability, WalletEvent, WalletFailure, WalletSigner};
