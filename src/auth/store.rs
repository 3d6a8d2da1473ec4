//! Signed-in session persistence
//!
//! [`CredentialStore`] owns the one [`StoredSession`] record and enforces the
//! fixed 24 hour window measured from sign-in. [`SessionGate`] is the
//! read-mostly view the rest of the program consults.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use crate::Result;
use crate::error::Error;
use super::identity::UserIdentity;

/// A session is valid while `now - issued_at <= SESSION_TTL_MS`
pub const SESSION_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// The persisted record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub identity: UserIdentity,
    pub issued_at_epoch_ms: i64,
}

impl StoredSession {
    /// Expired once older than [`SESSION_TTL_MS`]; a timestamp that is in the
    /// future or out of range never counts as a live session
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms
            .checked_sub(self.issued_at_epoch_ms)
            .map_or(true, |age| !(0..=SESSION_TTL_MS).contains(&age))
    }

    /// Milliseconds of validity left at `now_ms` (zero once expired)
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        self.issued_at_epoch_ms
            .saturating_add(SESSION_TTL_MS)
            .saturating_sub(now_ms)
            .clamp(0, SESSION_TTL_MS)
    }
}

/// Where the session record physically lives
pub trait SessionBackend: Send + Sync {
    fn read(&self) -> Result<Option<StoredSession>>;
    fn write(&self, session: &StoredSession) -> Result<()>;
    fn remove(&self) -> Result<()>;
}

/// Source of "now" in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// JSON file backend, readable only by the owner on Unix
#[derive(Debug, Clone)]
pub struct FileSessionBackend {
    path: PathBuf,
}

impl FileSessionBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionBackend for FileSessionBackend {
    fn read(&self) -> Result<Option<StoredSession>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str(&content) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!("Discarding unreadable session file {:?}: {}", self.path, e);
                self.remove()?;
                Ok(None)
            }
        }
    }

    fn write(&self, session: &StoredSession) -> Result<()> {
        // Create parent directory
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, content)?;

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }

    fn remove(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Process-local backend
#[derive(Debug, Default)]
pub struct MemorySessionBackend {
    slot: Mutex<Option<StoredSession>>,
}

impl MemorySessionBackend {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<StoredSession>>> {
        self.slot
            .lock()
            .map_err(|_| Error::Other("Session store lock poisoned".to_string()))
    }
}

impl SessionBackend for MemorySessionBackend {
    fn read(&self) -> Result<Option<StoredSession>> {
        Ok(self.lock()?.clone())
    }

    fn write(&self, session: &StoredSession) -> Result<()> {
        *self.lock()? = Some(session.clone());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}

/// Sole owner of the persisted session
pub struct CredentialStore {
    backend: Box<dyn SessionBackend>,
    clock: Arc<dyn Clock>,
}

impl CredentialStore {
    pub fn new(backend: impl SessionBackend + 'static) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: impl SessionBackend + 'static, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend: Box::new(backend),
            clock,
        }
    }

    /// File-backed store at `path`
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(FileSessionBackend::new(path))
    }

    /// In-memory store
    pub fn memory() -> Self {
        Self::new(MemorySessionBackend::default())
    }

    /// Persist `identity` as signed in now, replacing any prior session
    pub fn save(&self, identity: &UserIdentity) -> Result<StoredSession> {
        let session = StoredSession {
            identity: identity.clone(),
            issued_at_epoch_ms: self.clock.now_ms(),
        };
        self.backend.write(&session)?;
        tracing::info!(user_id = %identity.id, "Session saved");
        Ok(session)
    }

    /// The current session, or `None` if absent or older than 24 hours
    ///
    /// An expired record is deleted as a side effect. The window never
    /// slides: reading does not extend it.
    pub fn load(&self) -> Result<Option<StoredSession>> {
        let session = match self.backend.read()? {
            Some(session) => session,
            None => return Ok(None),
        };

        if session.is_expired_at(self.clock.now_ms()) {
            tracing::info!("Session expired, clearing");
            self.backend.remove()?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Delete the session unconditionally
    pub fn clear(&self) -> Result<()> {
        self.backend.remove()?;
        tracing::info!("Session cleared");
        Ok(())
    }

    pub fn is_signed_in(&self) -> Result<bool> {
        Ok(self.load()?.is_some())
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}

/// What the surrounding program consults before showing signed-in state
#[derive(Clone)]
pub struct SessionGate {
    store: Arc<CredentialStore>,
}

impl SessionGate {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    pub fn is_signed_in(&self) -> Result<bool> {
        self.store.is_signed_in()
    }

    pub fn identity(&self) -> Result<Option<UserIdentity>> {
        Ok(self.store.load()?.map(|s| s.identity))
    }

    /// Time left before the session lapses, if signed in
    pub fn remaining_ms(&self) -> Result<Option<i64>> {
        let now = self.store.now_ms();
        Ok(self.store.load()?.map(|s| s.remaining_ms(now)))
    }

    pub fn logout(&self) -> Result<()> {
        self.store.clear()
    }
}
