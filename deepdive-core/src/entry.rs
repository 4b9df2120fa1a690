//! The `deepdive(method, ...)` entry point
//!
//! Hosts may start issuing calls before the tracker is configured. Until then
//! calls are parked in a [`CommandQueue`]; initialization drains them in
//! order and from then on calls run immediately. Without a project id the
//! entry point turns itself off and swallows everything.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use serde_json::Value;

use crate::queue::CommandQueue;
use crate::tracker::{Tracker, TrackerBuilder};

enum State {
    Pending(CommandQueue),
    Ready(Box<Tracker>),
    Disabled,
}

/// Routes named calls to the tracker, buffering them until it exists
pub struct EntryPoint {
    state: State,
}

impl Default for EntryPoint {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryPoint {
    /// An entry point with an unbounded pre-init queue
    pub fn new() -> Self {
        Self::with_queue(CommandQueue::new())
    }

    pub fn with_queue(queue: CommandQueue) -> Self {
        Self {
            state: State::Pending(queue),
        }
    }

    /// Issue one call.
    pub fn call(&mut self, method: &str, args: Vec<Value>) {
        match &mut self.state {
            State::Pending(queue) => {
                queue.enqueue(method, args);
            }
            State::Ready(tracker) => tracker.call(method, &args),
            State::Disabled => {
                tracing::debug!(method = %method, "Tracker disabled, ignoring call");
            }
        }
    }

    /// Build the tracker and replay everything queued so far.
    ///
    /// Without a project id, or if the tracker cannot be built, the entry
    /// point is disabled for good. A second initialization is ignored.
    pub fn initialize(&mut self, builder: TrackerBuilder) {
        let mut queue = match &mut self.state {
            State::Pending(queue) => std::mem::take(queue),
            State::Ready(_) | State::Disabled => {
                tracing::warn!("DeepDive already initialized, ignoring");
                return;
            }
        };

        if builder.configured_project_id().is_none() {
            tracing::error!("DeepDive: Project ID is not set.");
            self.disable(queue);
            return;
        }

        let tracker = match builder.build() {
            Ok(tracker) => tracker,
            Err(e) => {
                tracing::error!(error = %e, "DeepDive: Failed to initialize tracker");
                self.disable(queue);
                return;
            }
        };

        let queued = queue.drain();
        tracing::info!(
            project_id = %tracker.project_id(),
            queued = queued.len(),
            "DeepDive initialized"
        );
        for command in queued {
            tracker.call(&command.method, &command.args);
        }
        if tracker.auto_pageview() {
            tracker.pageview();
        }
        self.state = State::Ready(Box::new(tracker));
    }

    fn disable(&mut self, mut queue: CommandQueue) {
        let dropped = queue.drain().len();
        if dropped > 0 {
            tracing::debug!(dropped, "Discarded queued calls");
        }
        self.state = State::Disabled;
    }

    /// The tracker, once initialized
    pub fn tracker_mut(&mut self) -> Option<&mut Tracker> {
        match &mut self.state {
            State::Ready(tracker) => Some(tracker.as_mut()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.state, State::Disabled)
    }

    /// Calls waiting for initialization
    pub fn pending(&self) -> usize {
        match &self.state {
            State::Pending(queue) => queue.len(),
            _ => 0,
        }
    }
}

/// The process-wide entry point
pub fn global() -> &'static Mutex<EntryPoint> {
    static ENTRY: OnceLock<Mutex<EntryPoint>> = OnceLock::new();
    ENTRY.get_or_init(|| Mutex::new(EntryPoint::new()))
}

/// Lock the process-wide entry point.
///
/// A panic while another caller held the lock does not wedge it; the entry
/// point's state is still usable.
pub fn lock_global() -> MutexGuard<'static, EntryPoint> {
    global().lock().unwrap_or_else(PoisonError::into_inner)
}

/// Issue one call through the process-wide entry point
pub fn deepdive(method: &str, args: Vec<Value>) {
    lock_global().call(method, args);
}
