//! CLI Integration Tests
//!
//! These tests verify the CLI commands work correctly end-to-end.
//! None of them needs a reachable API server.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const KEY_ONE: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

// ============================================================================
// Test Utilities
// ============================================================================

/// Create a CLI command with a temporary data directory
fn cli_cmd(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bitcast").expect("Failed to find bitcast binary");
    cmd.env_remove("BITCAST_WALLET_KEY")
        .env_remove("BITCAST_API_URL")
        .arg("--data-dir")
        .arg(data_dir.path());
    cmd
}

// ============================================================================
// Wallet Command Tests
// ============================================================================

#[test]
fn test_wallet_address_for_known_key() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["wallet", "address", "--key", KEY_ONE])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf",
        ));
}

#[test]
fn test_wallet_address_rejects_bad_key() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["wallet", "address", "--key", "not-hex"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid wallet key"));
}

#[test]
fn test_wallet_new_prints_address_and_secret() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["wallet", "new"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Address: 0x"))
        .stdout(predicate::str::contains("Secret:  0x"));
}

#[test]
fn test_wallet_key_from_env() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .env("BITCAST_WALLET_KEY", KEY_ONE)
        .args(["wallet", "address"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0x7e5f"));
}

// ============================================================================
// Session Command Tests
// ============================================================================

#[test]
fn test_session_show_on_fresh_data_dir() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["session", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Not signed in"));

    assert!(data_dir.path().join("session.redb").exists());
}

#[test]
fn test_sign_out_without_session_succeeds() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["session", "sign-out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed out"));

    cli_cmd(&data_dir)
        .args(["session", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Not signed in"));
}

#[test]
fn test_sign_in_requires_key() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["session", "sign-in"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--key"));
}

#[test]
fn test_invalid_api_url_is_rejected() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["--api-url", "ftp://example.com", "session", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open Bitcast client"));
}

// ============================================================================
// Feed Command Tests
// ============================================================================

#[test]
fn test_feed_list_rejects_unknown_sort() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["feed", "list", "--sort", "hottest"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("hottest"));
}

#[test]
fn test_feed_list_rejects_unknown_window() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["feed", "list", "--since", "2w"])
        .assert()
        .failure();
}

#[test]
fn test_feed_list_reports_unreachable_server() {
    let data_dir = TempDir::new().unwrap();

    // Port 9 (discard) refuses connections on test hosts
    cli_cmd(&data_dir)
        .args(["--api-url", "http://127.0.0.1:9/api", "feed", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error fetching posts"));
}
