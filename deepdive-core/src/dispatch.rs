//! Collection request dispatch
//!
//! A payload becomes a single GET against the collection endpoint:
//!
//! ```text
//! {collect_url}?event=pageview&user_id=…&session_id=…&…&project_id=…&_=1717232400000
//! ```
//!
//! The request is a pixel: nobody reads the response and nothing is retried.
//! Network failures, blocked requests and bad statuses are logged at debug
//! level and are otherwise invisible to the caller.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use url::Url;

use crate::clock::Clock;
use crate::command::EventType;
use crate::error::{Error, Result};
use crate::payload::EventPayload;

/// Name of the query parameter that carries the event type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventParam {
    #[default]
    #[serde(rename = "event")]
    Event,
    #[serde(rename = "event_type")]
    EventType,
}

impl EventParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventParam::Event => "event",
            EventParam::EventType => "event_type",
        }
    }
}

/// Issues a GET and forgets about it
pub trait Transport: Send + Sync {
    /// Start a request. An error means it could not even be started.
    fn send(&self, url: &str) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, url: &str) -> Result<()> {
        (**self).send(url)
    }
}

/// Keeps every URL it is asked to send
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    requests: Arc<Mutex<Vec<String>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs sent so far, oldest first
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, url: &str) -> Result<()> {
        self.requests.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// HTTP transport running requests on its own small runtime
pub struct HttpTransport {
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpTransport {
    /// Create a transport whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("deepdive-pixel")
            .enable_all()
            .build()
            .map_err(|e| Error::Transport(format!("failed to create runtime: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            runtime,
            in_flight: Mutex::new(Vec::new()),
        })
    }

    /// Wait up to `timeout` for requests that are still running.
    ///
    /// For hosts about to exit; requests still pending afterwards are dropped.
    /// Must not be called from inside an async runtime.
    pub fn flush(&self, timeout: Duration) {
        let handles = std::mem::take(&mut *self.in_flight.lock().unwrap());
        if handles.is_empty() {
            return;
        }
        let pending = handles.len();
        let finished = self.runtime.block_on(async {
            tokio::time::timeout(timeout, async {
                for handle in handles {
                    let _ = handle.await;
                }
            })
            .await
        });
        if finished.is_err() {
            tracing::debug!(pending, "Gave up waiting for collection requests");
        }
    }

    /// Number of requests started and not yet known to be finished
    pub fn in_flight(&self) -> usize {
        let mut in_flight = self.in_flight.lock().unwrap();
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.len()
    }
}

impl Transport for HttpTransport {
    fn send(&self, url: &str) -> Result<()> {
        let request = self.client.get(url);
        let handle = self.runtime.spawn(async move {
            match request.send().await {
                Ok(response) => {
                    tracing::trace!(status = %response.status(), "Collection request completed");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Collection request failed");
                }
            }
        });

        let mut in_flight = self.in_flight.lock().unwrap();
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.push(handle);
        Ok(())
    }
}

/// Turns payloads into collection requests for one project
pub struct Dispatcher {
    collect_url: Url,
    project_id: String,
    event_param: EventParam,
    transport: Box<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        collect_url: &str,
        project_id: impl Into<String>,
        event_param: EventParam,
        transport: Box<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self {
            collect_url: Url::parse(collect_url)?,
            project_id: project_id.into(),
            event_param,
            transport,
            clock,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The full request URL for `payload` sent at `now`
    pub fn request_url(&self, payload: &EventPayload, event: EventType, now: DateTime<Utc>) -> String {
        let mut url = self.collect_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(self.event_param.as_str(), event.as_str());
            for (key, value) in payload.iter() {
                query.append_pair(key, value);
            }
            query.append_pair("project_id", &self.project_id);
            query.append_pair("_", &now.timestamp_millis().to_string());
        }
        url.into()
    }

    /// Issue the collection request for `payload`. Never fails.
    pub fn send(&self, payload: &EventPayload, event: EventType) {
        let url = self.request_url(payload, event, self.clock.now());
        match self.transport.send(&url) {
            Ok(()) => tracing::debug!(event = %event, fields = payload.len(), "Dispatched event"),
            Err(e) => tracing::debug!(event = %event, error = %e, "Could not dispatch event"),
        }
    }
}
