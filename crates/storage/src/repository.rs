use async_trait::async_trait;
use poise_core::model::UserId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("identity unavailable: {0}")]
    Identity(String),
}

/// Keys of the flat per-user key-value layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistenceKey {
    /// Last-used session settings and accessibility toggles.
    SessionPreferences,
    /// Append-only list of completed session outcomes.
    SessionHistory,
    /// Completion ledger for all programs.
    ProgramProgress,
}

impl PersistenceKey {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PersistenceKey::SessionPreferences => "session-preferences",
            PersistenceKey::SessionHistory => "session-history",
            PersistenceKey::ProgramProgress => "program-progress",
        }
    }
}

impl fmt::Display for PersistenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable key-value storage scoped per user. Values are serialized JSON.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be reached.
    async fn load(&self, user: &UserId, key: PersistenceKey) -> Result<Option<String>, StorageError>;

    /// Replace the value stored under `key`. Last write wins.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    async fn save(&self, user: &UserId, key: PersistenceKey, value: &str)
    -> Result<(), StorageError>;
}

/// Source of the signed-in user's identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Identity` when no identity can be resolved.
    async fn current_user_id(&self) -> Result<UserId, StorageError>;
}

/// Identity fixed at startup (from configuration or a finished sign-in).
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    user: UserId,
}

impl StaticIdentity {
    #[must_use]
    pub fn new(user: UserId) -> Self {
        Self { user }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(UserId::anonymous())
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user_id(&self) -> Result<UserId, StorageError> {
        Ok(self.user.clone())
    }
}

/// Load and decode a JSON value.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the stored value does not decode
/// as `T`, or the backend error if the read fails.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    user: &UserId,
    key: PersistenceKey,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = store.load(user, key).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|err| StorageError::Serialization(format!("{key}: {err}")))
}

/// Encode and store a JSON value.
///
/// # Errors
///
/// Returns `StorageError` if encoding or the write fails.
pub async fn save_json<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    user: &UserId,
    key: PersistenceKey,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)
        .map_err(|err| StorageError::Serialization(format!("{key}: {err}")))?;
    store.save(user, key, &raw).await
}

/// Simple in-memory store for testing and prototyping.
///
/// `set_available(false)` makes every call fail with a connection error, which
/// mimics the hosted backend being unreachable.
#[derive(Clone)]
pub struct InMemoryRepository {
    entries: Arc<Mutex<HashMap<(UserId, PersistenceKey), String>>>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Connection("backend unavailable".into()))
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryRepository {
    async fn load(&self, user: &UserId, key: PersistenceKey) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&(user.clone(), key)).cloned())
    }

    async fn save(
        &self,
        user: &UserId,
        key: PersistenceKey,
        value: &str,
    ) -> Result<(), StorageError> {
        self.check_available()?;
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert((user.clone(), key), value.to_string());
        Ok(())
    }
}

/// Aggregates the persistence and identity ports behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub kv: Arc<dyn KeyValueStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl Storage {
    #[must_use]
    pub fn in_memory(user: UserId) -> Self {
        Self {
            kv: Arc::new(InMemoryRepository::new()),
            identity: Arc::new(StaticIdentity::new(user)),
        }
    }

    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { kv, identity }
    }
}
