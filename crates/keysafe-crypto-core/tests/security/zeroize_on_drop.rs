//! Verify that secret containers wipe their bytes when dropped.
//!
//! Heap checks scan the freed region for a sentinel pattern rather than
//! asserting all zeros: the allocator may write its own bookkeeping into a
//! freed block.
//!
//! **UB caveat:** reading freed memory is undefined behaviour. These are
//! best-effort smoke tests meant for the debug profile.

use keysafe_crypto_core::kdf::{mac_key, stretch_key, MIN_ITERATIONS};
use keysafe_crypto_core::memory::{SecretBuffer, SecretBytes};
use zeroize::Zeroize;

const SENTINEL: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

#[test]
fn secret_buffer_sentinel_not_found_after_drop() {
    let sentinel_data: Vec<u8> = SENTINEL.iter().copied().cycle().take(4096).collect();

    let data_ptr: *const u8;
    let data_len: usize;
    {
        let buf = SecretBuffer::new(&sentinel_data);
        let exposed = buf.expose();
        data_ptr = exposed.as_ptr();
        data_len = exposed.len();
        assert_eq!(&exposed[..4], &SENTINEL);
    }

    // SAFETY: intentionally reads just-freed memory; see module docs.
    let sentinel_found = unsafe {
        let slice = std::slice::from_raw_parts(data_ptr, data_len);
        slice.windows(4).any(|w| w == SENTINEL)
    };
    assert!(!sentinel_found, "sentinel survived SecretBuffer drop");
}

#[test]
fn secret_bytes_zeroize_in_place() {
    let mut key = SecretBytes::<32>::new([0xA5; 32]);
    key.zeroize();
    assert!(key.expose().iter().all(|&b| b == 0));
}

#[test]
fn stretched_and_mac_keys_are_masked() {
    let key = stretch_key(b"enchilada-sonol", &[1u8; 32], MIN_ITERATIONS).unwrap();
    let mac = mac_key(&key);
    assert_eq!(format!("{key:?}"), "SecretBytes<32>(***)");
    assert_eq!(format!("{mac}"), "SecretBytes<32>(***)");
}
