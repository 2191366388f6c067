//! In-process wallet holding a secp256k1 key.
//!
//! Produces Ethereum-style addresses and EIP-191 `personal_sign`
//! signatures, the same shapes a browser wallet hands back. Used by the
//! CLI and by tests that want real signatures.

use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use parking_lot::RwLock;
use rand::RngCore;
use sha3::{Digest, Keccak256};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{WalletCapability, WalletEvent, WalletFailure, WalletSigner};

const EVENT_CAPACITY: usize = 16;

/// Key or signature material that could not be used
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid private key")]
    InvalidKey,

    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// Keccak-256 digest of an EIP-191 personal message.
pub fn personal_sign_hash(message: &str) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// `0x`-prefixed lowercase address of a public key.
pub fn address_of(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 uncompressed marker
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Sign `message` as `personal_sign` does: `0x` + r ‖ s ‖ v, v in {27, 28}.
pub fn sign_personal(key: &SigningKey, message: &str) -> Result<String, KeyError> {
    let digest = personal_sign_hash(message);
    let (signature, recid) = key
        .sign_prehash_recoverable(&digest)
        .map_err(|e| KeyError::InvalidSignature(e.to_string()))?;
    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(recid.to_byte() + 27);
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Address that produced `signature` over `message`.
pub fn recover_signer(message: &str, signature: &str) -> Result<String, KeyError> {
    let bytes = decode_hex(signature)?;
    if bytes.len() != 65 {
        return Err(KeyError::InvalidSignature(format!(
            "expected 65 bytes, got {}",
            bytes.len()
        )));
    }

    let v = bytes[64];
    let recid = RecoveryId::from_byte(if v >= 27 { v - 27 } else { v })
        .ok_or_else(|| KeyError::InvalidSignature(format!("bad recovery id {}", v)))?;
    let sig = Signature::from_slice(&bytes[..64])
        .map_err(|e| KeyError::InvalidSignature(e.to_string()))?;

    let digest = personal_sign_hash(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &sig, recid)
        .map_err(|e| KeyError::InvalidSignature(e.to_string()))?;
    Ok(address_of(&key))
}

fn decode_hex(input: &str) -> Result<Vec<u8>, KeyError> {
    let trimmed = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(trimmed).map_err(|e| KeyError::InvalidHex(e.to_string()))
}

struct WalletState {
    key: Option<SigningKey>,
    connected: bool,
}

/// Wallet backed by a key held in memory.
pub struct LocalKeyWallet {
    state: RwLock<WalletState>,
    events: broadcast::Sender<WalletEvent>,
}

impl LocalKeyWallet {
    pub fn new(key: Option<SigningKey>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(WalletState {
                key,
                connected: true,
            }),
            events,
        }
    }

    /// Wallet with no account. Every request reports it as unavailable.
    pub fn locked() -> Self {
        Self::new(None)
    }

    /// Wallet for a hex-encoded 32-byte private key (`0x` prefix optional).
    pub fn from_hex(secret: &str) -> Result<Self, KeyError> {
        let bytes = decode_hex(secret.trim())?;
        let key = SigningKey::from_slice(&bytes).map_err(|_| KeyError::InvalidKey)?;
        Ok(Self::new(Some(key)))
    }

    /// Wallet for a fresh random key.
    pub fn generate() -> Self {
        Self::new(Some(generate_key()))
    }

    /// Active address, `None` when locked.
    pub fn address(&self) -> Option<String> {
        self.state.read().key.as_ref().map(|k| address_of(k.verifying_key()))
    }

    /// Hex of the private key, for exporting a generated wallet.
    pub fn secret_hex(&self) -> Option<String> {
        self.state
            .read()
            .key
            .as_ref()
            .map(|k| format!("0x{}", hex::encode(k.to_bytes())))
    }

    /// Replace the active key and announce the account change.
    pub fn switch_key(&self, key: Option<SigningKey>) {
        let accounts: Vec<String> = key
            .as_ref()
            .map(|k| address_of(k.verifying_key()))
            .into_iter()
            .collect();
        self.state.write().key = key;
        info!(?accounts, "Wallet account switched");
        let _ = self.events.send(WalletEvent::AccountsChanged(accounts));
    }

    pub fn connect(&self) {
        self.state.write().connected = true;
        debug!("Wallet connected");
        let _ = self.events.send(WalletEvent::Connected);
    }

    pub fn disconnect(&self) {
        self.state.write().connected = false;
        debug!("Wallet disconnected");
        let _ = self.events.send(WalletEvent::Disconnected);
    }

    fn active_key(&self) -> Result<SigningKey, WalletFailure> {
        let state = self.state.read();
        if !state.connected {
            return Err(WalletFailure::Unavailable("wallet is disconnected".into()));
        }
        state
            .key
            .clone()
            .ok_or_else(|| WalletFailure::Unavailable("wallet has no account".into()))
    }
}

fn generate_key() -> SigningKey {
    loop {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        // Zero or >= curve order is rejected; try again
        if let Ok(key) = SigningKey::from_slice(&bytes) {
            return key;
        }
    }
}

struct LocalSigner {
    key: SigningKey,
    address: String,
}

#[async_trait]
impl WalletSigner for LocalSigner {
    fn address(&self) -> &str {
        &self.address
    }

    async fn sign_message(&self, message: &str) -> Result<String, WalletFailure> {
        sign_personal(&self.key, message).map_err(|e| WalletFailure::provider(e.to_string()))
    }
}

#[async_trait]
impl WalletCapability for LocalKeyWallet {
    async fn request_accounts(&self) -> Result<Vec<String>, WalletFailure> {
        let key = self.active_key()?;
        Ok(vec![address_of(key.verifying_key())])
    }

    async fn current_address(&self) -> Result<Option<String>, WalletFailure> {
        let state = self.state.read();
        if !state.connected {
            return Ok(None);
        }
        Ok(state.key.as_ref().map(|k| address_of(k.verifying_key())))
    }

    async fn signer(&self) -> Result<Box<dyn WalletSigner>, WalletFailure> {
        let key = self.active_key()?;
        let address = address_of(key.verifying_key());
        Ok(Box::new(LocalSigner { key, address }))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}
