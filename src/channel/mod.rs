//! Publish/subscribe contract consumed by stores.
//!
//! Stores never assume exclusive access to a channel and never assume
//! whether delivery is synchronous or queued. Two reference transports
//! are provided: [`LocalChannel`] (synchronous loopback) and
//! [`ChannelHub`] (simulated cross-process bus).

mod bridge;
mod local;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

pub use bridge::{BridgedChannel, ChannelHub};
pub use local::{EmittedMessage, LocalChannel};

/// Callback invoked for every message on a topic.
pub type ChannelHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifies a registered handler so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Minimal transport contract.
pub trait Channel: Send + Sync {
    /// Register `handler` for `topic`.
    fn on(&self, topic: &str, handler: ChannelHandler) -> HandlerId;

    /// Remove a handler previously returned by [`Channel::on`].
    fn off(&self, topic: &str, handler: HandlerId);

    /// Publish `message` on `topic`.
    fn emit(&self, topic: &str, message: Value);
}

/// Topic → handlers table shared by the reference transports.
///
/// Handlers are cloned out before being invoked so a handler may call
/// back into the channel (emit, on, off) without deadlocking.
#[derive(Default)]
pub(crate) struct HandlerTable {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(HandlerId, ChannelHandler)>>>,
}

impl HandlerTable {
    pub(crate) fn insert(&self, topic: &str, handler: ChannelHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    pub(crate) fn remove(&self, topic: &str, id: HandlerId) {
        let mut handlers = self.handlers.lock();
        if let Some(entries) = handlers.get_mut(topic) {
            entries.retain(|(entry_id, _)| *entry_id != id);
            if entries.is_empty() {
                handlers.remove(topic);
            }
        }
    }

    pub(crate) fn dispatch(&self, topic: &str, message: &Value) {
        let targets: Vec<ChannelHandler> = self
            .handlers
            .lock()
            .get(topic)
            .map(|entries| entries.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();

        for handler in targets {
            handler(message);
        }
    }

    pub(crate) fn handler_count(&self, topic: &str) -> usize {
        self.handlers.lock().get(topic).map_or(0, Vec::len)
    }
}
