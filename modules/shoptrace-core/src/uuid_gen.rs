//! Client-id generation: RFC-4122 v4 identifiers.
//!
//! The OS entropy source is preferred, but its failure must not fail the
//! caller — a visitor without a cookie still needs an id. Uniqueness, not
//! unpredictability, is the hard requirement here, so the fallback is a
//! clock-seeded PRNG.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng, TryRngCore};

/// Generate a v4 UUID string (`xxxxxxxx-xxxx-4xxx-yxxx-…`).
pub fn generate() -> String {
    let mut bytes = [0u8; 16];

    if OsRng.try_fill_bytes(&mut bytes).is_err() {
        tracing::warn!("OS entropy unavailable, generating client id from seeded PRNG");
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        StdRng::seed_from_u64(seed).fill_bytes(&mut bytes);
    }

    uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
}
