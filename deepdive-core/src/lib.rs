//! # deepdive-core
//!
//! Core library for deepdive - a visitor, session and event instrumentation
//! client.
//!
//! This library provides:
//! - Visitor identity and session resolution over layered storage
//! - A pre-initialization command queue with in-order replay
//! - Payload assembly and fire-and-forget pixel dispatch
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! A call flows through four stages:
//! - **Entry:** `deepdive(method, args)` is queued until the tracker exists
//! - **Resolution:** the visitor id (`dd_uid`, 365 days) and the sliding
//!   session (`dd_sid`, 30 minutes) are read from storage and refreshed
//! - **Assembly:** common page context merged with the event's own fields
//! - **Dispatch:** one GET against the collection endpoint, never awaited
//!
//! ## Example
//!
//! ```rust,no_run
//! use deepdive_core::{Config, EntryPoint, Tracker};
//! use serde_json::json;
//!
//! let config = Config::load().expect("failed to load config");
//!
//! let mut entry = EntryPoint::new();
//! entry.call("customEvent", vec![json!("signup"), json!({"plan": "pro"})]);
//!
//! // replays the queued call, then sends the initial pageview
//! entry.initialize(Tracker::builder(config.tracker));
//! ```

// Re-export commonly used items at the crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Amount, Command, EventType};
pub use config::{Config, TrackerConfig};
pub use context::PageContext;
pub use dispatch::{Dispatcher, EventParam, HttpTransport, RecordingTransport, Transport};
pub use entry::{deepdive, global, lock_global, EntryPoint};
pub use error::{Error, Result};
pub use payload::{EventPayload, PayloadAssembler, TimestampStyle};
pub use queue::{CommandQueue, QueuedCommand};
pub use storage::{CookieJar, MemoryStore, SqliteStore, StorageBackend, StorageTier};
pub use tracker::{Tracker, TrackerBuilder};

// Public modules
pub mod clock;
pub mod command;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod id;
pub mod identity;
pub mod logging;
pub mod payload;
pub mod queue;
pub mod session;
pub mod storage;
pub mod tracker;
