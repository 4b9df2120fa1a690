//! Tiered key/value persistence
//!
//! Visitor and session state lives in an ordered chain of storage tiers:
//! - a primary store ([`SqliteStore`]) that keeps values without expiry
//! - a cookie mirror ([`CookieJar`]) that carries a lifetime per entry
//!
//! Reads stop at the first tier holding a non-empty value; writes go to every
//! tier. A tier that fails is skipped silently, so privacy-mode style
//! restrictions degrade to whatever tiers still work. If every tier fails,
//! reads come back empty and writes are lost.

mod cookie;
mod memory;
mod sqlite;

use chrono::Duration;

use crate::error::Result;

pub use cookie::{Cookie, CookieJar};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// One level of the storage chain.
pub trait StorageTier: Send + Sync {
    /// Short name used in log output
    fn name(&self) -> &'static str;

    /// Read a value; `Ok(None)` means the key is absent here
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value. `ttl` of `None` or zero means "until the session ends"
    /// for tiers that expire entries; tiers without expiry ignore it.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
}

/// Ordered list of storage tiers with read fallback and write fan-out.
pub struct StorageBackend {
    tiers: Vec<Box<dyn StorageTier>>,
}

impl StorageBackend {
    /// Build a backend that consults `tiers` in the given order
    pub fn new(tiers: Vec<Box<dyn StorageTier>>) -> Self {
        Self { tiers }
    }

    /// Primary store followed by its cookie mirror
    pub fn standard(primary: impl StorageTier + 'static, cookies: impl StorageTier + 'static) -> Self {
        Self::new(vec![Box::new(primary), Box::new(cookies)])
    }

    /// Read `key` from the first tier that has a non-empty value.
    pub fn get(&self, key: &str) -> Option<String> {
        for tier in &self.tiers {
            match tier.get(key) {
                Ok(Some(value)) if !value.is_empty() => return Some(value),
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(tier = tier.name(), key, error = %e, "Storage read failed");
                }
            }
        }
        None
    }

    /// Write `key` to every tier, ignoring tiers that refuse the write.
    pub fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        for tier in &self.tiers {
            if let Err(e) = tier.set(key, value, ttl) {
                tracing::debug!(tier = tier.name(), key, error = %e, "Storage write failed");
            }
        }
    }

    /// Number of configured tiers
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }
}
