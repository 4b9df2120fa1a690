//! Integration tests for the deepdive tracking pipeline
//!
//! Each "page load" builds a fresh tracker over on-disk stores in a temp
//! directory, driven by a manual clock and a recording transport.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use deepdive_core::identity::IDENTITY_KEY;
use deepdive_core::session::{StoredSession, SESSION_KEY};
use deepdive_core::{
    CookieJar, EntryPoint, ManualClock, MemoryStore, PageContext, RecordingTransport,
    SqliteStore, StorageBackend, StorageTier, Tracker, TrackerConfig,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use url::Url;

/// Query pairs of a recorded request, in order
fn query(url: &str) -> Vec<(String, String)> {
    Url::parse(url).unwrap().query_pairs().into_owned().collect()
}

fn field(pairs: &[(String, String)], key: &str) -> String {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| panic!("missing field {key}"))
}

fn page() -> PageContext {
    PageContext {
        url: "https://shop.example/?utm_source=news".to_string(),
        title: "Shop".to_string(),
        language: "en-US".to_string(),
        user_agent: "Mozilla/5.0 Chrome/120.0 Safari/537.36".to_string(),
        viewport_width: Some(1280),
        screen_width: 1920,
        screen_height: 1080,
        ..Default::default()
    }
}

fn on_disk_storage(dir: &Path, clock: Arc<ManualClock>) -> StorageBackend {
    StorageBackend::standard(
        SqliteStore::open(&dir.join("store.db")).unwrap(),
        CookieJar::open(&dir.join("cookies.json"), clock).unwrap(),
    )
}

/// Simulate one page load with the initial pageview
fn page_load(dir: &Path, clock: &Arc<ManualClock>, transport: &RecordingTransport) -> EntryPoint {
    deepdive_core::logging::init_test();
    let mut entry = EntryPoint::new();
    entry.initialize(
        Tracker::builder(TrackerConfig::default())
            .project_id("proj_123")
            .page(page())
            .storage(on_disk_storage(dir, clock.clone()))
            .clock(clock.clone())
            .transport(transport.clone()),
    );
    assert!(entry.is_ready());
    entry
}

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

#[test]
fn first_visit_creates_visitor_and_session() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = RecordingTransport::new();

    page_load(dir.path(), &clock, &transport);

    let sent = transport.requests();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with("https://collect.backend.deep-dive.cloud/?event=pageview&"));

    let pairs = query(&sent[0]);
    let user_id = field(&pairs, "user_id");
    assert_eq!(user_id.len(), 36);
    assert_eq!(&user_id[14..15], "4");
    assert_eq!(field(&pairs, "referrer"), "direct");
    assert_eq!(field(&pairs, "utm_source"), "news");
    assert_eq!(field(&pairs, "device_type"), "desktop");
    assert_eq!(field(&pairs, "screen_resolution"), "1920x1080");
    assert_eq!(field(&pairs, "browser"), "Chrome");
    assert_eq!(field(&pairs, "project_id"), "proj_123");
    assert_eq!(field(&pairs, "_"), t0().timestamp_millis().to_string());

    // both tiers hold the visitor and session
    let store = SqliteStore::open(&dir.path().join("store.db")).unwrap();
    assert_eq!(store.get(IDENTITY_KEY).unwrap(), Some(user_id.clone()));
    let jar = CookieJar::open(&dir.path().join("cookies.json"), clock.clone()).unwrap();
    assert_eq!(jar.get(IDENTITY_KEY).unwrap(), Some(user_id));
    assert_eq!(
        jar.cookie(IDENTITY_KEY).unwrap().expires,
        Some(t0() + Duration::days(365))
    );
    assert_eq!(
        jar.cookie(SESSION_KEY).unwrap().expires,
        Some(t0() + Duration::minutes(30))
    );

    let stored = StoredSession::parse(&store.get(SESSION_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(stored.id, field(&pairs, "session_id"));
    assert_eq!(stored.last_seen_ms, t0().timestamp_millis());
}

#[test]
fn session_slides_then_rotates_after_inactivity() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = RecordingTransport::new();

    page_load(dir.path(), &clock, &transport);
    clock.advance(Duration::minutes(10));
    page_load(dir.path(), &clock, &transport);

    // the session cookie deadline slides with the touch, the visitor's does not
    let jar = CookieJar::open(&dir.path().join("cookies.json"), clock.clone()).unwrap();
    assert_eq!(
        jar.cookie(SESSION_KEY).unwrap().expires,
        Some(t0() + Duration::minutes(40))
    );
    assert_eq!(
        jar.cookie(IDENTITY_KEY).unwrap().expires,
        Some(t0() + Duration::days(365))
    );

    clock.advance(Duration::minutes(31));
    page_load(dir.path(), &clock, &transport);

    let sent: Vec<_> = transport.requests().iter().map(|u| query(u)).collect();
    assert_eq!(sent.len(), 3);

    let users: Vec<String> = sent.iter().map(|p| field(p, "user_id")).collect();
    assert!(users.iter().all(|u| u == &users[0]));

    let sessions: Vec<String> = sent.iter().map(|p| field(p, "session_id")).collect();
    assert_eq!(sessions[0], sessions[1]);
    assert_ne!(sessions[1], sessions[2]);
}

#[test]
fn forty_minute_gap_starts_new_session() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = RecordingTransport::new();

    page_load(dir.path(), &clock, &transport);
    clock.advance(Duration::minutes(40));
    page_load(dir.path(), &clock, &transport);

    let sent: Vec<_> = transport.requests().iter().map(|u| query(u)).collect();
    assert_eq!(field(&sent[0], "user_id"), field(&sent[1], "user_id"));
    assert_ne!(field(&sent[0], "session_id"), field(&sent[1], "session_id"));
}

#[test]
fn gap_of_exactly_thirty_minutes_keeps_session() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = RecordingTransport::new();

    page_load(dir.path(), &clock, &transport);
    clock.advance(Duration::minutes(30));
    page_load(dir.path(), &clock, &transport);

    let sent: Vec<_> = transport.requests().iter().map(|u| query(u)).collect();
    assert_eq!(field(&sent[0], "session_id"), field(&sent[1], "session_id"));
}

#[test]
fn purchase_round_trip() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = RecordingTransport::new();

    let mut entry = page_load(dir.path(), &clock, &transport);
    entry.call(
        "purchase",
        vec![
            json!([{"id": "sku1"}]),
            json!(19.5),
            json!("EUR"),
            json!(3.9),
            json!(4.95),
            json!("T1"),
        ],
    );

    let sent = transport.requests();
    assert_eq!(sent.len(), 2);
    let pairs = query(&sent[1]);
    assert_eq!(field(&pairs, "event"), "purchase");
    assert_eq!(field(&pairs, "transaction_id"), "T1");
    assert_eq!(field(&pairs, "value"), "19.5");
    assert_eq!(field(&pairs, "tax"), "3.9");
    assert_eq!(field(&pairs, "shipping"), "4.95");
    assert_eq!(field(&pairs, "currency"), "EUR");

    let items: Value = serde_json::from_str(&field(&pairs, "items")).unwrap();
    assert_eq!(items, json!([{"id": "sku1"}]));
}

#[test]
fn queued_calls_drain_in_order_past_unknown_methods() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = RecordingTransport::new();

    let mut entry = EntryPoint::new();
    entry.call("customEvent", vec![json!("first"), json!({"n": 1})]);
    entry.call("doesNotExist", vec![json!(1)]);
    entry.call("addToCart", vec![json!("not enough arguments")]);
    entry.call("customEvent", vec![json!("second")]);
    assert!(transport.requests().is_empty());

    entry.initialize(
        Tracker::builder(TrackerConfig::default())
            .project_id("proj_123")
            .storage(on_disk_storage(dir.path(), clock.clone()))
            .clock(clock.clone())
            .transport(transport.clone()),
    );

    let sent: Vec<_> = transport.requests().iter().map(|u| query(u)).collect();
    let events: Vec<String> = sent.iter().map(|p| field(p, "event")).collect();
    assert_eq!(events, vec!["custom_event", "custom_event", "pageview"]);
    assert_eq!(field(&sent[0], "name"), "first");
    assert_eq!(field(&sent[0], "params"), r#"{"n":1}"#);
    assert_eq!(field(&sent[1], "name"), "second");
    assert_eq!(field(&sent[1], "params"), "{}");
}

#[test]
fn missing_project_id_sends_nothing() {
    let transport = RecordingTransport::new();
    let mut entry = EntryPoint::new();
    entry.call("pageview", vec![]);

    entry.initialize(
        Tracker::builder(TrackerConfig::default())
            .project_id("")
            .transport(transport.clone()),
    );
    entry.call("customEvent", vec![json!("late")]);

    assert!(entry.is_disabled());
    assert!(transport.requests().is_empty());
}

#[test]
fn broken_primary_store_degrades_to_cookies() {
    struct Refusing;

    impl StorageTier for Refusing {
        fn name(&self) -> &'static str {
            "refusing"
        }

        fn get(&self, _key: &str) -> deepdive_core::Result<Option<String>> {
            Err(deepdive_core::Error::Storage("access denied".to_string()))
        }

        fn set(
            &self,
            _key: &str,
            _value: &str,
            _ttl: Option<Duration>,
        ) -> deepdive_core::Result<()> {
            Err(deepdive_core::Error::Storage("access denied".to_string()))
        }
    }

    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let transport = RecordingTransport::new();
    let cookie_path = dir.path().join("cookies.json");

    for _ in 0..2 {
        let mut entry = EntryPoint::new();
        entry.initialize(
            Tracker::builder(TrackerConfig::default())
                .project_id("proj_123")
                .storage(StorageBackend::standard(
                    Refusing,
                    CookieJar::open(&cookie_path, clock.clone()).unwrap(),
                ))
                .clock(clock.clone())
                .transport(transport.clone()),
        );
        clock.advance(Duration::minutes(5));
    }

    let sent: Vec<_> = transport.requests().iter().map(|u| query(u)).collect();
    assert_eq!(sent.len(), 2);
    assert_eq!(field(&sent[0], "user_id"), field(&sent[1], "user_id"));
    assert_eq!(field(&sent[0], "session_id"), field(&sent[1], "session_id"));
}

#[test]
fn storage_failure_everywhere_still_sends() {
    let transport = RecordingTransport::new();
    let mut entry = EntryPoint::new();
    entry.initialize(
        Tracker::builder(TrackerConfig::default())
            .project_id("proj_123")
            .storage(StorageBackend::new(Vec::new()))
            .transport(transport.clone()),
    );

    let sent = transport.requests();
    assert_eq!(sent.len(), 1);
    let pairs = query(&sent[0]);
    assert_eq!(field(&pairs, "user_id").len(), 36);
    assert!(!field(&pairs, "session_id").is_empty());
}

#[test]
fn debug_id_from_page_url_is_attached() {
    let transport = RecordingTransport::new();
    let session_store = MemoryStore::new();
    let config = TrackerConfig {
        debug_id: true,
        ..Default::default()
    };
    let page = PageContext {
        url: "https://shop.example/?debug_id=3f2b8c1e-9d4a-4b7e-a1c2-5e6f7a8b9c0d".to_string(),
        ..Default::default()
    };

    let tracker = Tracker::builder(config)
        .project_id("proj_123")
        .page(page)
        .session_store(Arc::new(session_store.clone()))
        .transport(transport.clone())
        .build()
        .unwrap();
    tracker.custom_event("debugging", json!({}));

    let pairs = query(&transport.requests()[0]);
    assert_eq!(
        field(&pairs, "debug_id"),
        "3f2b8c1e-9d4a-4b7e-a1c2-5e6f7a8b9c0d"
    );
    assert_eq!(session_store.len(), 1);
}
