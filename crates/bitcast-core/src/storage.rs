//! Durable holder for the single persisted session record.
//!
//! The store is deliberately dumb: get, set, clear. Only the
//! [`AuthSessionManager`](crate::auth::AuthSessionManager) writes it; other
//! components (the HTTP feed source) only read the access token.
//!
//! A missing record and a record that fails to decode are both reported as
//! "no session".

use crate::error::StoreError;
use crate::types::Session;
use parking_lot::{Mutex, RwLock};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Well-known key the session record lives under
pub const SESSION_KEY: &str = "bitcast.auth_user";

const SESSION_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("session");

/// Key/value holder for one serialized [`Session`].
pub trait SessionStore: Send + Sync {
    /// Read the stored session, `None` if absent or malformed.
    fn get(&self) -> Result<Option<Session>, StoreError>;

    /// Replace the stored session.
    fn set(&self, session: &Session) -> Result<(), StoreError>;

    /// Remove the stored session. Succeeds when nothing is stored.
    fn clear(&self) -> Result<(), StoreError>;
}

fn encode(session: &Session) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(session).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Option<Session> {
    match serde_json::from_slice::<Session>(bytes) {
        Ok(session) if !session.access_token.is_empty() => Some(session),
        Ok(_) => {
            warn!("Stored session has no access token, ignoring");
            None
        }
        Err(e) => {
            warn!(error = %e, "Stored session record is malformed, ignoring");
            None
        }
    }
}

/// Session store backed by a redb database file.
#[derive(Clone)]
pub struct RedbSessionStore {
    db: Arc<RwLock<Database>>,
}

impl RedbSessionStore {
    /// Open (or create) the store at the given path.
    ///
    /// Creates the parent directory and the session table if needed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SESSION_TABLE)?;
        }
        write_txn.commit()?;

        debug!(?path, "Opened session store");

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    fn read_raw(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(SESSION_TABLE)?;
        let value = table.get(SESSION_KEY)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    fn write_raw(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSION_TABLE)?;
            table.insert(SESSION_KEY, bytes)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl SessionStore for RedbSessionStore {
    fn get(&self) -> Result<Option<Session>, StoreError> {
        Ok(self.read_raw()?.as_deref().and_then(decode))
    }

    fn set(&self, session: &Session) -> Result<(), StoreError> {
        let bytes = encode(session)?;
        self.write_raw(&bytes)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSION_TABLE)?;
            table.remove(SESSION_KEY)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

/// In-memory session store, for tests and ephemeral clients.
#[derive(Default)]
pub struct MemorySessionStore {
    record: Mutex<Option<Vec<u8>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with raw record bytes.
    pub fn with_raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            record: Mutex::new(Some(bytes.into())),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Result<Option<Session>, StoreError> {
        Ok(self.record.lock().as_deref().and_then(decode))
    }

    fn set(&self, session: &Session) -> Result<(), StoreError> {
        let bytes = encode(session)?;
        *self.record.lock() = Some(bytes);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.record.lock() = None;
        Ok(())
    }
}
