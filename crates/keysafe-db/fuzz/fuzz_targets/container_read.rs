//! Fuzz target for container framing and record decoding.
//!
//! Writes the input to a scratch file and reads it back as a container.
//! Both the V3 and the legacy paths are reached through auto-probing.
//!
//! ```sh
//! cd crates/keysafe-db
//! cargo +nightly fuzz run container_read -- -max_len=16384
//! ```

#![no_main]

use keysafe_db::{Container, ContainerConfig, FileContext, ReadOutcome};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let path = std::env::temp_dir().join(format!("keysafe-fuzz-{}.dat", std::process::id()));
    if std::fs::write(&path, data).is_err() {
        return;
    }
    let config = ContainerConfig {
        max_field_len: 1 << 16,
        ..ContainerConfig::default()
    };
    if let Ok(mut c) = Container::open(&path, b"fuzz", None, FileContext::system(), &config) {
        while let Ok(ReadOutcome::Record(_)) = c.read_record() {}
    }
    let _ = keysafe_db::check_password(&path, b"fuzz", None);
});
