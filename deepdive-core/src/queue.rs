//! Buffer for calls made before the tracker exists
//!
//! Calls are kept as raw method names and JSON arguments, exactly as the host
//! issued them, and handed back once in insertion order. After that single
//! drain the queue is spent: later drains are empty and later enqueues are
//! refused, since callers are expected to talk to the tracker directly.

use serde_json::Value;

/// A call waiting for the tracker
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedCommand {
    pub method: String,
    pub args: Vec<Value>,
}

/// FIFO buffer with an optional capacity and a one-time drain
#[derive(Debug, Default)]
pub struct CommandQueue {
    buffer: Vec<QueuedCommand>,
    capacity: Option<usize>,
    drained: bool,
}

impl CommandQueue {
    /// An unbounded queue
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue that refuses calls once `capacity` are waiting
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Append a call. Returns `false` if it was dropped.
    pub fn enqueue(&mut self, method: impl Into<String>, args: Vec<Value>) -> bool {
        let method = method.into();
        if self.drained {
            tracing::warn!(method = %method, "Command queue already drained, dropping call");
            return false;
        }
        if self.capacity.is_some_and(|cap| self.buffer.len() >= cap) {
            tracing::warn!(
                method = %method,
                capacity = ?self.capacity,
                "Command queue full, dropping call"
            );
            return false;
        }
        self.buffer.push(QueuedCommand { method, args });
        true
    }

    /// Take every waiting call in insertion order. Only the first drain
    /// returns anything.
    pub fn drain(&mut self) -> Vec<QueuedCommand> {
        if self.drained {
            return Vec::new();
        }
        self.drained = true;
        std::mem::take(&mut self.buffer)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }
}
