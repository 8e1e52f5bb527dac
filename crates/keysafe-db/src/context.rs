//! Runtime collaborators passed into every container operation.
//!
//! The randomness source, the wall clock and the saver's identity travel in
//! a [`FileContext`] value instead of living in process globals, so tests
//! can pin all three.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use keysafe_crypto_core::SecureRng;
use rand::rngs::OsRng;

/// Wall-clock source, in whole seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now_epoch_secs(&self) -> u64;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_epoch_secs(&self) -> u64 {
        self.0
    }
}

/// Who is saving: stamped into the header and written to lock sidecars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveIdentity {
    /// Login name.
    pub user: String,
    /// Host name.
    pub host: String,
    /// Process id.
    pub pid: u32,
}

impl SaveIdentity {
    /// Identity of the current process.
    ///
    /// Falls back to `"unknown"` when the user or host cannot be determined.
    #[must_use]
    pub fn current() -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".into());
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".into());
        Self {
            user,
            host,
            pid: std::process::id(),
        }
    }

    /// `user@host:pid`, the lock sidecar payload.
    #[must_use]
    pub fn lock_text(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.pid)
    }
}

/// Everything a container needs from its environment.
pub struct FileContext {
    /// Source of salts, IVs, padding and file UUIDs.
    pub rng: Box<dyn SecureRng>,
    /// Source of header and history timestamps.
    pub clock: Arc<dyn Clock>,
    /// Saver identity for header stamping.
    pub identity: SaveIdentity,
}

impl FileContext {
    /// OS randomness, the system clock and the current process identity.
    #[must_use]
    pub fn system() -> Self {
        Self {
            rng: Box::new(OsRng),
            clock: Arc::new(SystemClock),
            identity: SaveIdentity::current(),
        }
    }

    /// Build a context from explicit parts.
    #[must_use]
    pub fn new(rng: Box<dyn SecureRng>, clock: Arc<dyn Clock>, identity: SaveIdentity) -> Self {
        Self {
            rng,
            clock,
            identity,
        }
    }

    /// Current time truncated to the 32 bits the file formats store.
    #[must_use]
    pub fn now_u32(&self) -> u32 {
        u32::try_from(self.clock.now_epoch_secs()).unwrap_or(u32::MAX)
    }
}

impl std::fmt::Debug for FileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileContext")
            .field("now", &self.clock.now_epoch_secs())
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Generate a random RFC 4122 version 4 UUID.
pub(crate) fn generate_uuid(rng: &mut dyn SecureRng) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);

    // Set version (4) and variant (RFC 4122).
    bytes[6] = (bytes[6] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    bytes
}
