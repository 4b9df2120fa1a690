//! The tracker bound to one project
//!
//! A [`Tracker`] resolves the visitor and session, assembles the payload and
//! dispatches it, once per call. Nothing here returns an error to the caller:
//! an event that cannot be built or sent is logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::command::{Amount, Cart, Command, Order};
use crate::config::TrackerConfig;
use crate::context::PageContext;
use crate::dispatch::{Dispatcher, HttpTransport, Transport};
use crate::error::{Error, Result};
use crate::identity::IdentityResolver;
use crate::payload::PayloadAssembler;
use crate::session::SessionResolver;
use crate::storage::{CookieJar, MemoryStore, SqliteStore, StorageBackend, StorageTier};

/// Collects everything a [`Tracker`] needs
pub struct TrackerBuilder {
    config: TrackerConfig,
    project_id: Option<String>,
    storage: Option<StorageBackend>,
    session_store: Option<Arc<dyn StorageTier>>,
    page: PageContext,
    transport: Option<Box<dyn Transport>>,
    clock: Arc<dyn Clock>,
}

impl TrackerBuilder {
    /// Start from configuration; the project id is taken from the
    /// environment or the config file.
    pub fn new(config: TrackerConfig) -> Self {
        let project_id = config.resolve_project_id();
        Self {
            config,
            project_id,
            storage: None,
            session_store: None,
            page: PageContext::default(),
            transport: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Persistent storage for visitor and session state
    pub fn storage(mut self, storage: StorageBackend) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Session-scoped store for values captured on load
    pub fn session_store(mut self, store: Arc<dyn StorageTier>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn page(mut self, page: PageContext) -> Self {
        self.page = page;
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The project id the tracker would be bound to; blank counts as unset
    pub fn configured_project_id(&self) -> Option<&str> {
        self.project_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Build the tracker.
    ///
    /// Unset parts default to an in-memory primary store with a cookie
    /// mirror, an in-memory session store and the HTTP transport.
    pub fn build(self) -> Result<Tracker> {
        self.config.validate()?;
        let project_id = self
            .configured_project_id()
            .map(str::to_string)
            .ok_or_else(|| Error::Config("no project id configured".to_string()))?;

        let storage = match self.storage {
            Some(storage) => storage,
            None => StorageBackend::standard(
                SqliteStore::open_in_memory()?,
                CookieJar::new(self.clock.clone()),
            ),
        };
        let storage = Arc::new(storage);

        let transport = match self.transport {
            Some(transport) => transport,
            None => Box::new(HttpTransport::new(Duration::from_secs(
                self.config.timeout_secs,
            ))?),
        };

        let mut assembler = PayloadAssembler::new(
            IdentityResolver::new(storage.clone(), self.clock.clone()),
            SessionResolver::new(storage),
            self.page,
            self.config.timestamp_style,
        );
        if self.config.debug_id {
            let store = self
                .session_store
                .unwrap_or_else(|| Arc::new(MemoryStore::new()));
            assembler = assembler.with_debug_store(store);
            if let Some(debug_id) = assembler.capture_debug_id() {
                tracing::info!(debug_id = %debug_id, "Captured debug id");
            }
        }

        let dispatcher = Dispatcher::new(
            &self.config.collect_url,
            project_id,
            self.config.event_param,
            transport,
            self.clock.clone(),
        )?;

        Ok(Tracker {
            assembler,
            dispatcher,
            clock: self.clock,
            auto_pageview: self.config.auto_pageview,
        })
    }
}

/// An initialized tracker for a single project
pub struct Tracker {
    assembler: PayloadAssembler,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    auto_pageview: bool,
}

impl Tracker {
    pub fn builder(config: TrackerConfig) -> TrackerBuilder {
        TrackerBuilder::new(config)
    }

    pub fn project_id(&self) -> &str {
        self.dispatcher.project_id()
    }

    pub fn page(&self) -> &PageContext {
        self.assembler.page()
    }

    /// Whether a pageview is sent as part of initialization
    pub fn auto_pageview(&self) -> bool {
        self.auto_pageview
    }

    /// Run one command. Unrecognized commands are logged and skipped.
    pub fn execute(&self, command: &Command) {
        if let Command::Unrecognized(method) = command {
            tracing::error!(method = %method, "DeepDive: Method {} does not exist.", method);
            return;
        }
        let Some((event, fields)) = self.assembler.event_fields(command) else {
            return;
        };
        let payload = self.assembler.assemble(fields, self.clock.now());
        self.dispatcher.send(&payload, event);
    }

    /// Run a call given by method name and positional JSON arguments
    pub fn call(&self, method: &str, args: &[Value]) {
        match Command::from_call(method, args) {
            Ok(command) => self.execute(&command),
            Err(e) => tracing::error!(method = %method, error = %e, "DeepDive: Rejected call"),
        }
    }

    pub fn pageview(&self) {
        self.execute(&Command::Pageview);
    }

    pub fn custom_event(&self, name: impl Into<String>, params: Value) {
        self.execute(&Command::CustomEvent {
            name: name.into(),
            params,
        });
    }

    pub fn view_item(&self, items: Value) {
        self.execute(&Command::ViewItem { items });
    }

    pub fn add_to_cart(&self, items: Value, value: impl Into<Amount>, currency: impl Into<String>) {
        self.execute(&Command::AddToCart(Cart {
            items,
            value: value.into(),
            currency: currency.into(),
        }));
    }

    pub fn checkout(&self, items: Value, value: impl Into<Amount>, currency: impl Into<String>) {
        self.execute(&Command::Checkout(Cart {
            items,
            value: value.into(),
            currency: currency.into(),
        }));
    }

    pub fn purchase(
        &self,
        items: Value,
        value: impl Into<Amount>,
        currency: impl Into<String>,
        tax: impl Into<Amount>,
        shipping: impl Into<Amount>,
        transaction_id: impl Into<String>,
    ) {
        self.execute(&Command::Purchase(Order {
            items,
            value: value.into(),
            currency: currency.into(),
            tax: tax.into(),
            shipping: shipping.into(),
            transaction_id: transaction_id.into(),
        }));
    }
}
