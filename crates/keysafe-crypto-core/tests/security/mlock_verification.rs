//! Check that secret buffers report their `mlock` state honestly.
//!
//! `mlock` may fail under a low `RLIMIT_MEMLOCK` (CI, containers); the
//! tests accept that and only check consistency.

use keysafe_crypto_core::memory::SecretBuffer;

#[cfg(unix)]
#[test]
fn empty_buffer_counts_as_pinned() {
    let buf = SecretBuffer::new(&[]);
    assert!(buf.is_empty());
    assert!(buf.is_mlocked());
}

#[cfg(target_os = "linux")]
#[test]
fn pinned_buffer_shows_in_vmlck() {
    let before = read_vmlck_kb();
    let buf = SecretBuffer::new(&vec![0xAA; 65536]);
    if buf.is_mlocked() {
        assert!(
            read_vmlck_kb() > before,
            "VmLck did not grow after mlock: before={before}KB"
        );
    } else {
        eprintln!("mlock unavailable here, VmLck check skipped");
    }
    drop(buf);
}

#[cfg(target_os = "linux")]
fn read_vmlck_kb() -> u64 {
    let status = std::fs::read_to_string("/proc/self/status").unwrap();
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmLck:"))
        .and_then(|rest| rest.trim().trim_end_matches(" kB").trim().parse().ok())
        .unwrap_or(0)
}
