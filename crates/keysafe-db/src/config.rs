//! Container tuning knobs, persisted as JSON next to the application data.
//!
//! Nothing here is secret. The iteration count chosen at write time is
//! stored in each V3 file, so changing it only affects files saved later.

use std::fs;
use std::path::Path;

use keysafe_crypto_core::{MAX_USABLE_ITERATIONS, MIN_ITERATIONS};
use serde::{Deserialize, Serialize};

// ── Defaults ───────────────────────────────────────────────────────

/// Iteration count used for new V3 files.
pub const DEFAULT_ITERATIONS: u32 = MIN_ITERATIONS << 2;

/// Largest single field value a reader will allocate for (16 MiB).
pub const DEFAULT_MAX_FIELD_LEN: u64 = 16 * 1024 * 1024;

const CONFIG_FILE: &str = "keysafe.json";

// ── Config ─────────────────────────────────────────────────────────

/// Settings applied when opening or creating a container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    /// Stretch rounds for newly written V3 files.
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Ceiling on a single field's declared length. The file length is
    /// always an additional bound.
    #[serde(default = "default_max_field_len")]
    pub max_field_len: u64,

    /// Application name stamped into the header on save.
    #[serde(default = "default_application")]
    pub application: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            max_field_len: default_max_field_len(),
            application: default_application(),
        }
    }
}

const fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}
const fn default_max_field_len() -> u64 {
    DEFAULT_MAX_FIELD_LEN
}
fn default_application() -> String {
    format!("keysafe v{}", env!("CARGO_PKG_VERSION"))
}

impl ContainerConfig {
    /// Iteration count a writer should use.
    ///
    /// Values below [`MIN_ITERATIONS`] are raised to it. Values above
    /// [`MAX_USABLE_ITERATIONS`] are kept but logged, since every later open
    /// pays for them.
    #[must_use]
    pub fn effective_iterations(&self) -> u32 {
        if self.iterations < MIN_ITERATIONS {
            tracing::warn!(
                requested = self.iterations,
                minimum = MIN_ITERATIONS,
                "iteration count raised to minimum"
            );
            return MIN_ITERATIONS;
        }
        if self.iterations > MAX_USABLE_ITERATIONS {
            tracing::warn!(
                requested = self.iterations,
                limit = MAX_USABLE_ITERATIONS,
                "iteration count above usable limit, opens will be slow"
            );
        }
        self.iterations
    }

    /// Load from `{dir}/keysafe.json`.
    ///
    /// Returns [`Default::default()`] when the file is missing or holds
    /// invalid JSON.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        fs::read_to_string(dir.join(CONFIG_FILE)).map_or_else(
            |_| Self::default(),
            |contents| serde_json::from_str(&contents).unwrap_or_default(),
        )
    }

    /// Write to `{dir}/keysafe.json` via a temporary file and rename.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the directory is missing or the write or
    /// rename fails.
    pub fn save(&self, dir: &Path) -> std::io::Result<()> {
        let path = dir.join(CONFIG_FILE);
        let tmp = dir.join(".keysafe.json.tmp");

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &path)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
