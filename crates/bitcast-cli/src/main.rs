//! Bitcast CLI
//!
//! Thin wrapper around bitcast-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Generate a throwaway wallet key
//! bitcast wallet new
//!
//! # Sign in by signing the challenge with a key
//! bitcast session sign-in --key 0x...
//!
//! # Show the stored session
//! bitcast session show
//!
//! # List the top posts of the last 24 hours, two pages deep
//! bitcast feed list --sort top --since 24h --pages 2
//!
//! # Forget the stored session
//! bitcast session sign-out
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bitcast_core::logging::setup_logging;
use bitcast_core::{
    shorten_address, BitcastClient, ClientConfig, FilterUpdate, LoadOutcome, LocalKeyWallet,
    Notice, NoticeLevel, Post, SinceWindow, SortDirection, SortKey,
};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::debug;

/// Bitcast - wallet sign-in and post feed
#[derive(Parser)]
#[command(name = "bitcast")]
#[command(version = "0.1.0")]
#[command(about = "Bitcast - wallet sign-in and post feed")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Data directory (default: ~/.bitcast)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// API base URL
    #[arg(long, global = true, env = "BITCAST_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Session management
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Feed browsing
    Feed {
        #[command(subcommand)]
        action: FeedAction,
    },

    /// Local wallet keys
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Show the stored session
    Show,
    /// Sign the challenge and exchange it for a session
    SignIn {
        /// Hex-encoded secp256k1 private key
        #[arg(long, env = "BITCAST_WALLET_KEY", hide_env_values = true)]
        key: String,
    },
    /// Forget the stored session
    SignOut,
}

#[derive(Subcommand)]
enum FeedAction {
    /// List posts
    List {
        /// Sort key: recent, top or random
        #[arg(long, default_value = "recent")]
        sort: SortKey,
        /// Sort direction: asc or desc
        #[arg(long, default_value = "desc")]
        order: SortDirection,
        /// Time window: 1h, 6h, 24h or 7d (default: all time)
        #[arg(long)]
        since: Option<SinceWindow>,
        /// Only posts in this topic
        #[arg(long)]
        topic: Option<String>,
        /// Only posts by this author address
        #[arg(long)]
        author: Option<String>,
        /// Posts per page
        #[arg(long)]
        page_size: Option<u32>,
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
}

#[derive(Subcommand)]
enum WalletAction {
    /// Generate a new random key
    New,
    /// Print the address of a key
    Address {
        /// Hex-encoded secp256k1 private key
        #[arg(long, env = "BITCAST_WALLET_KEY", hide_env_values = true)]
        key: String,
    },
}

/// Get the default data directory (~/.bitcast)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bitcast")
}

fn parse_key(key: &str) -> Result<LocalKeyWallet> {
    LocalKeyWallet::from_hex(key).map_err(|e| anyhow::anyhow!("Invalid wallet key: {}", e))
}

fn open_client(config: &ClientConfig, wallet: LocalKeyWallet) -> Result<BitcastClient> {
    BitcastClient::from_config(config.clone(), Arc::new(wallet))
        .context("Failed to open Bitcast client")
}

/// Print notices published so far
fn print_notices(rx: &mut broadcast::Receiver<Notice>) {
    while let Ok(notice) = rx.try_recv() {
        match notice.level {
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
            _ => println!("{}", notice.message),
        }
    }
}

fn print_post(post: &Post) {
    let topic = if post.topic_label.is_empty() {
        String::new()
    } else {
        format!(" [{}]", post.topic_label)
    };
    println!(
        "{}  {}  +{}{}",
        post.id,
        shorten_address(&post.author_address),
        post.upvote_count,
        topic
    );
    if !post.caption_text.is_empty() {
        println!("    {}", post.caption_text);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    debug!(data_dir = %data_dir.display(), "Using data directory");
    let mut config = ClientConfig::default().with_data_dir(&data_dir);
    if let Some(url) = cli.api_url {
        config = config.with_api_base_url(url);
    }

    match cli.command {
        Commands::Session { action } => match action {
            SessionAction::Show => {
                let client = open_client(&config, LocalKeyWallet::locked())?;
                match client.start() {
                    Some(session) => {
                        println!("Signed in");
                        println!("  Address: {}", session.identity_address);
                        println!("  Issued:  {}", session.issued_at.to_rfc3339());
                    }
                    None => println!("Not signed in"),
                }
            }
            SessionAction::SignIn { key } => {
                let wallet = parse_key(&key)?;
                let client = open_client(&config, wallet)?;
                let mut notices = client.notices();
                client.start();

                let result = client.sign_in().await;
                print_notices(&mut notices);
                let session = result.context("Sign-in failed")?;
                println!("  Address: {}", session.identity_address);
            }
            SessionAction::SignOut => {
                let client = open_client(&config, LocalKeyWallet::locked())?;
                client.start();
                client.sign_out();
                println!("Signed out");
            }
        },

        Commands::Feed { action } => match action {
            FeedAction::List {
                sort,
                order,
                since,
                topic,
                author,
                page_size,
                pages,
            } => {
                let client = open_client(&config, LocalKeyWallet::locked())?;
                let mut notices = client.notices();
                client.start();

                let mut update = FilterUpdate::new()
                    .sort(sort)
                    .direction(order)
                    .since(since)
                    .topic(topic)
                    .author(author);
                if let Some(size) = page_size {
                    update = update.page_size(size);
                }

                let mut outcome = client.set_filter(update).await;
                for _ in 1..pages {
                    if !client.has_more() || matches!(outcome, LoadOutcome::Failed(_)) {
                        break;
                    }
                    outcome = client.load_more().await;
                }
                print_notices(&mut notices);
                if let LoadOutcome::Failed(e) = outcome {
                    return Err(e).context("Failed to load feed");
                }

                let filter = client.filter();
                let items = client.feed_items();
                println!(
                    "{} posts ({}, {})",
                    items.len(),
                    filter.sort_key().label(),
                    SinceWindow::label_for(filter.since_window())
                );
                for post in &items {
                    print_post(post);
                }
                if !client.has_more() {
                    println!("(end of feed)");
                }
            }
        },

        Commands::Wallet { action } => match action {
            WalletAction::New => {
                let wallet = LocalKeyWallet::generate();
                let address = wallet.address().context("Generated wallet has no key")?;
                let secret = wallet.secret_hex().context("Generated wallet has no key")?;
                println!("Address: {}", address);
                println!("Secret:  {}", secret);
                println!();
                println!("Keep the secret safe; it controls the address.");
            }
            WalletAction::Address { key } => {
                let wallet = parse_key(&key)?;
                let address = wallet.address().context("Wallet has no key")?;
                println!("{}", address);
            }
        },
    }

    Ok(())
}
