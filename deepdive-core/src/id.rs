//! Visitor and session identifier generation
//!
//! Identifiers are UUIDv4-shaped strings built from the current time and a
//! time-seeded [`SmallRng`]. They are unique enough to correlate analytics
//! events but are predictable: never use them as security tokens.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use uuid::{Uuid, Variant};

const TEMPLATE: &str = "xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx";

/// Distinguishes seeds drawn within the same timer tick.
static SEED_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a 36-character UUIDv4-shaped identifier.
///
/// Each hex digit is the low nibble of the millisecond timestamp plus one
/// random draw; the timestamp is shifted a nibble per digit. The version
/// nibble is fixed to `4` and the variant nibble to `8..=b`.
pub fn generate_id(now: DateTime<Utc>) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let counter = SEED_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut d = (now.timestamp_millis() as u64).wrapping_add(nanos % 1_000_000);
    let mut rng = SmallRng::seed_from_u64(nanos ^ d.rotate_left(32) ^ counter.wrapping_mul(0x9e37_79b9_7f4a_7c15));

    TEMPLATE
        .chars()
        .map(|c| match c {
            'x' | 'y' => {
                let r = ((d % 16) as u32 + rng.gen_range(0..16)) % 16;
                d /= 16;
                let nibble = if c == 'x' { r } else { (r & 0x3) | 0x8 };
                char::from_digit(nibble, 16).unwrap_or('0')
            }
            other => other,
        })
        .collect()
}

/// Strictly check the hyphenated UUIDv4 form (case-insensitive).
pub fn is_uuid_v4(candidate: &str) -> bool {
    if candidate.len() != 36 {
        return false;
    }
    match Uuid::parse_str(candidate) {
        Ok(uuid) => uuid.get_version_num() == 4 && uuid.get_variant() == Variant::RFC4122,
        Err(_) => false,
    }
}
