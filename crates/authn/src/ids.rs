//! Identifier generation.
//!
//! Session and audit ids combine a millisecond timestamp with a random
//! suffix, so two ids minted in the same millisecond by concurrent requests
//! still differ, and ids sort roughly by creation time.

use chrono::{DateTime, Utc};
use rand::RngCore;

/// Random bytes in the suffix of a time-ordered id.
const SUFFIX_BYTES: usize = 8;

/// Returns `{millis:x}-{16 hex chars}`.
pub(crate) fn time_ordered_id(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().max(0);
    format!("{millis:x}-{}", random_hex(SUFFIX_BYTES))
}

/// Returns `len` random bytes, hex encoded.
pub(crate) fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
