//! Pending-request persistence
//!
//! Exactly one authorization request is in flight at a time. The store holds
//! its serialized form across the redirect round trip and gives it back once:
//! `take` removes the entry as a side effect, so a callback can never be
//! replayed against the same request.

use crate::request::AuthorizationRequest;
use oxidc_types::{AuthError, AuthResult};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage for the single in-flight authorization request
pub trait PendingRequestStore: Send + Sync {
    /// Persist the request, replacing any previous entry.
    fn put(&self, request: &AuthorizationRequest) -> AuthResult<()>;

    /// Remove and return the pending request.
    ///
    /// Fails with [`AuthError::NoPendingRequest`] when nothing is stored —
    /// the expected condition when a callback arrives without a prior
    /// authorization attempt.
    fn take(&self) -> AuthResult<AuthorizationRequest>;
}

/// In-memory store, suitable for loopback flows that live and die within one
/// process
#[derive(Default)]
pub struct MemoryPendingStore {
    slot: Mutex<Option<AuthorizationRequest>>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingRequestStore for MemoryPendingStore {
    fn put(&self, request: &AuthorizationRequest) -> AuthResult<()> {
        *self.slot.lock() = Some(request.clone());
        Ok(())
    }

    fn take(&self) -> AuthResult<AuthorizationRequest> {
        self.slot.lock().take().ok_or(AuthError::NoPendingRequest)
    }
}

/// Get the directory holding persisted flow state
///
/// Priority:
/// 1. Runtime override via `OXIDC_ENV` environment variable: `~/.oxidc-{env}/`
/// 2. Development mode (debug builds): `~/.oxidc-dev/`
/// 3. Production mode (release builds): `~/.oxidc/`
pub fn state_dir() -> AuthResult<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AuthError::Configuration("Could not determine home directory".to_string()))?;

    if let Ok(env_suffix) = std::env::var("OXIDC_ENV") {
        return Ok(home.join(format!(".oxidc-{}", env_suffix)));
    }

    #[cfg(debug_assertions)]
    let dir = home.join(".oxidc-dev");

    #[cfg(not(debug_assertions))]
    let dir = home.join(".oxidc");

    Ok(dir)
}

/// Default location of the pending-request file
pub fn default_store_path() -> AuthResult<PathBuf> {
    Ok(state_dir()?.join("pending_request.json"))
}

/// File-backed store for redirect flows
///
/// A full-page redirect can outlive the process entirely: the browser leaves,
/// the program exits, and a fresh process parses the callback. The request is
/// therefore written to disk as JSON, verifier included, and deleted on
/// `take`.
pub struct FilePendingStore {
    path: PathBuf,
}

impl FilePendingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the well-known per-user location.
    pub fn at_default_location() -> AuthResult<Self> {
        Ok(Self::new(default_store_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PendingRequestStore for FilePendingStore {
    fn put(&self, request: &AuthorizationRequest) -> AuthResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write-then-rename so a crash mid-write never leaves a torn entry
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(request)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!("Persisted pending request {} to {}", request.id, self.path.display());
        Ok(())
    }

    fn take(&self) -> AuthResult<AuthorizationRequest> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::NoPendingRequest);
            }
            Err(e) => return Err(e.into()),
        };

        let request: AuthorizationRequest = serde_json::from_str(&json)?;

        // Single use: the entry is gone whether or not the caller succeeds
        std::fs::remove_file(&self.path)?;

        debug!("Took pending request {} from {}", request.id, self.path.display());
        Ok(request)
    }
}
