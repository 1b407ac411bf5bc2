//! Cryptographic session collaborator.
//!
//! The daemon never owns the encryption scheme; it only needs to know
//! whether a session exists before accepting work, and to close it once
//! during shutdown.

use std::sync::Mutex;
use zeroize::Zeroizing;

/// Capability exposed by the cryptographic session provider.
pub trait CryptoSession: Send + Sync {
    fn has_session(&self) -> bool;
    fn close_session(&self);
}

/// Session backed by key material handed to the process at startup.
///
/// The key is wrapped in [`Zeroizing`] so closing the session wipes it
/// from memory rather than leaving it to the allocator.
pub struct StaticKeySession {
    key: Mutex<Option<Zeroizing<String>>>,
}

impl StaticKeySession {
    /// Environment variable holding the session key material.
    pub const KEY_ENV: &'static str = "CONSENTD_SESSION_KEY";

    /// Read the session key from the environment. An absent or empty
    /// variable yields a session that reports itself unavailable.
    pub fn from_env() -> Self {
        let key = std::env::var(Self::KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(Zeroizing::new);
        Self {
            key: Mutex::new(key),
        }
    }

    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: Mutex::new(Some(Zeroizing::new(key.into()))),
        }
    }

    /// A session that was never established.
    pub fn absent() -> Self {
        Self {
            key: Mutex::new(None),
        }
    }
}

impl CryptoSession for StaticKeySession {
    fn has_session(&self) -> bool {
        self.key.lock().map(|k| k.is_some()).unwrap_or(false)
    }

    fn close_session(&self) {
        if let Ok(mut key) = self.key.lock() {
            key.take();
        }
    }
}
