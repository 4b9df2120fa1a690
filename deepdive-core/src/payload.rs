//! Event payload assembly
//!
//! Every event carries the common context (visitor, session, time, page) and
//! then its own fields. The two are merged shallowly: an event field with the
//! same name as a context field replaces it.
//!
//! | Event | Extra fields |
//! |-------|--------------|
//! | `pageview` | `utm_*` present in the URL, `device_type`, `screen_resolution`, `browser` |
//! | `custom_event` | `name`, `params` (JSON) |
//! | `view_item` | `items` (JSON) |
//! | `add_to_cart`, `checkout` | `items` (JSON), `value`, `currency` |
//! | `purchase` | `items` (JSON), `value`, `currency`, `tax`, `shipping`, `transaction_id` |

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::command::{Cart, Command, EventType};
use crate::context::PageContext;
use crate::id::is_uuid_v4;
use crate::identity::IdentityResolver;
use crate::session::SessionResolver;
use crate::storage::StorageTier;

/// Session-scoped storage key for a captured debug id
pub const DEBUG_ID_KEY: &str = "dd_debug_id";

/// Page query parameter that carries a debug id
pub const DEBUG_ID_PARAM: &str = "debug_id";

/// How the `timestamp` field is rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampStyle {
    /// `2024-06-01T11:00:00+02:00` in the page's offset
    #[default]
    Local,
    /// `2024-06-01T09:00:00.000Z`
    Utc,
}

impl TimestampStyle {
    pub fn format(&self, now: DateTime<Utc>, offset: Option<FixedOffset>) -> String {
        const LOCAL: &str = "%Y-%m-%dT%H:%M:%S%:z";
        match (self, offset) {
            (TimestampStyle::Local, Some(offset)) => {
                now.with_timezone(&offset).format(LOCAL).to_string()
            }
            (TimestampStyle::Local, None) => now.with_timezone(&Local).format(LOCAL).to_string(),
            (TimestampStyle::Utc, _) => now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Flat, ordered field map sent with one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPayload {
    fields: Vec<(String, String)>,
}

impl EventPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field. An existing field keeps its position and takes the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Shallow merge where `other` wins on collisions
    pub fn merge(&mut self, other: EventPayload) {
        for (key, value) in other.fields {
            self.insert(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EventPayload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut payload = EventPayload::new();
        for (key, value) in iter {
            payload.insert(key, value);
        }
        payload
    }
}

/// Builds payloads from resolved identity, session and page context
pub struct PayloadAssembler {
    identity: IdentityResolver,
    session: SessionResolver,
    page: PageContext,
    timestamp_style: TimestampStyle,
    debug_store: Option<Arc<dyn StorageTier>>,
}

impl PayloadAssembler {
    pub fn new(
        identity: IdentityResolver,
        session: SessionResolver,
        page: PageContext,
        timestamp_style: TimestampStyle,
    ) -> Self {
        Self {
            identity,
            session,
            page,
            timestamp_style,
            debug_store: None,
        }
    }

    /// Enable debug ids, kept in the given session-scoped store
    pub fn with_debug_store(mut self, store: Arc<dyn StorageTier>) -> Self {
        self.debug_store = Some(store);
        self
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    /// Capture a `debug_id` from the page URL into the session store.
    ///
    /// Only a strictly formed UUIDv4 is accepted. Returns the captured id.
    pub fn capture_debug_id(&self) -> Option<String> {
        let store = self.debug_store.as_ref()?;
        let candidate = self.page.query_param(DEBUG_ID_PARAM)?;
        if !is_uuid_v4(&candidate) {
            tracing::debug!(debug_id = %candidate, "Ignoring malformed debug id");
            return None;
        }
        if let Err(e) = store.set(DEBUG_ID_KEY, &candidate, None) {
            tracing::debug!(error = %e, "Failed to store debug id");
            return None;
        }
        Some(candidate)
    }

    fn debug_id(&self) -> Option<String> {
        let store = self.debug_store.as_ref()?;
        match store.get(DEBUG_ID_KEY) {
            Ok(Some(id)) if is_uuid_v4(&id) => Some(id),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read debug id");
                None
            }
        }
    }

    /// Fields attached to every event. Resolving them touches the session.
    pub fn common_context(&self, now: DateTime<Utc>) -> EventPayload {
        let mut payload = EventPayload::new();
        payload.insert("user_id", self.identity.resolve());
        payload.insert("session_id", self.session.resolve(now));
        payload.insert(
            "timestamp",
            self.timestamp_style.format(now, self.page.utc_offset),
        );
        payload.insert("url", self.page.url.as_str());
        payload.insert("title", self.page.title.as_str());
        payload.insert("referrer", self.page.referrer_or_direct());
        payload.insert("language", self.page.language.as_str());
        if let Some(debug_id) = self.debug_id() {
            payload.insert("debug_id", debug_id);
        }
        payload
    }

    /// Common context merged with `extra`; `extra` wins on collisions.
    pub fn assemble(&self, extra: EventPayload, now: DateTime<Utc>) -> EventPayload {
        let mut payload = self.common_context(now);
        payload.merge(extra);
        payload
    }

    /// Event type and event-specific fields for a command
    pub fn event_fields(&self, command: &Command) -> Option<(EventType, EventPayload)> {
        let event = command.event_type()?;
        let mut fields = EventPayload::new();
        match command {
            Command::Pageview => {
                for (key, value) in self.page.utm_params() {
                    fields.insert(key, value);
                }
                fields.insert("device_type", self.page.device_type());
                fields.insert("screen_resolution", self.page.screen_resolution());
                fields.insert("browser", self.page.browser());
            }
            Command::CustomEvent { name, params } => {
                fields.insert("name", name.as_str());
                fields.insert("params", params.to_string());
            }
            Command::ViewItem { items } => {
                fields.insert("items", items.to_string());
            }
            Command::AddToCart(cart) | Command::Checkout(cart) => {
                insert_cart(&mut fields, cart);
            }
            Command::Purchase(order) => {
                fields.insert("items", order.items.to_string());
                fields.insert("value", order.value.to_string());
                fields.insert("currency", order.currency.as_str());
                fields.insert("tax", order.tax.to_string());
                fields.insert("shipping", order.shipping.to_string());
                fields.insert("transaction_id", order.transaction_id.as_str());
            }
            Command::Unrecognized(_) => return None,
        }
        Some((event, fields))
    }
}

fn insert_cart(fields: &mut EventPayload, cart: &Cart) {
    fields.insert("items", cart.items.to_string());
    fields.insert("value", cart.value.to_string());
    fields.insert("currency", cart.currency.as_str());
}
