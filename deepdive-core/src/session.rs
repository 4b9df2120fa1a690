//! Sliding-window browsing sessions
//!
//! The session is stored as `"{id}_{last_seen_epoch_millis}"`. Every
//! resolution writes: it either creates a session (none stored, unreadable,
//! or idle for longer than [`session_window`]) or touches the existing one by
//! re-persisting the same id with the new timestamp. The expiry deadline
//! therefore slides forward with activity.
//!
//! Storage is shared between every tracker running against the same store.
//! Two of them touching or rotating near the window boundary race with
//! last-write-wins semantics, so the id may flap briefly. No locking is
//! attempted.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::id::generate_id;
use crate::storage::StorageBackend;

/// Storage key for the session composite value
pub const SESSION_KEY: &str = "dd_sid";

/// Inactivity window after which a session rotates; also the cookie lifetime
pub fn session_window() -> Duration {
    Duration::minutes(30)
}

/// Decoded form of the stored session value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub id: String,
    pub last_seen_ms: i64,
}

impl StoredSession {
    /// Parse `"{id}_{millis}"`. Returns `None` for anything else.
    pub fn parse(value: &str) -> Option<Self> {
        let (id, last_seen) = value.split_once('_')?;
        if id.is_empty() {
            return None;
        }
        let last_seen_ms = last_seen.parse().ok()?;
        Some(Self {
            id: id.to_string(),
            last_seen_ms,
        })
    }

    pub fn encode(&self) -> String {
        format!("{}_{}", self.id, self.last_seen_ms)
    }

    /// Last touch as a timestamp
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.last_seen_ms).single()
    }
}

/// Resolves the current session id, creating, rotating or touching it.
pub struct SessionResolver {
    storage: Arc<StorageBackend>,
}

impl SessionResolver {
    pub fn new(storage: Arc<StorageBackend>) -> Self {
        Self { storage }
    }

    /// Return the session id for a touch at `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> String {
        let now_ms = now.timestamp_millis();

        let stored = match self.storage.get(SESSION_KEY) {
            Some(value) => match StoredSession::parse(&value) {
                Some(session) => Some(session),
                None => {
                    tracing::debug!(value = %value, "Discarding unreadable session value");
                    None
                }
            },
            None => None,
        };

        let window_ms = session_window().num_milliseconds();
        let session = match stored {
            Some(session) => match now_ms.checked_sub(session.last_seen_ms) {
                Some(idle_ms) if idle_ms <= window_ms => StoredSession {
                    id: session.id,
                    last_seen_ms: now_ms,
                },
                // An unrepresentable gap counts as expired
                idle_ms => {
                    tracing::debug!(
                        session_id = %session.id,
                        idle_ms = ?idle_ms,
                        "Session expired, rotating"
                    );
                    self.create(now)
                }
            },
            None => self.create(now),
        };

        self.storage
            .set(SESSION_KEY, &session.encode(), Some(session_window()));
        session.id
    }

    /// The stored session, without touching it
    pub fn peek(&self) -> Option<StoredSession> {
        self.storage
            .get(SESSION_KEY)
            .and_then(|value| StoredSession::parse(&value))
    }

    fn create(&self, now: DateTime<Utc>) -> StoredSession {
        let session = StoredSession {
            id: generate_id(now),
            last_seen_ms: now.timestamp_millis(),
        };
        tracing::debug!(session_id = %session.id, "Started session");
        session
    }
}
