//! Synchronous in-process channel.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::{Channel, ChannelHandler, HandlerId, HandlerTable};

/// A message recorded by a [`LocalChannel`] created with history enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedMessage {
    pub topic: String,
    pub message: Value,
}

/// Loopback channel delivering every emit synchronously to all handlers
/// registered for the topic, the emitter's own handlers included.
///
/// Several runtime contexts may share one `LocalChannel` to stand in for
/// separate processes.
#[derive(Default)]
pub struct LocalChannel {
    handlers: HandlerTable,
    history: Option<Mutex<Vec<EmittedMessage>>>,
}

impl LocalChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a channel that records every emitted message.
    pub fn with_history() -> Arc<Self> {
        Arc::new(Self {
            handlers: HandlerTable::default(),
            history: Some(Mutex::new(Vec::new())),
        })
    }

    /// Messages emitted so far (empty unless created with history).
    pub fn history(&self) -> Vec<EmittedMessage> {
        self.history
            .as_ref()
            .map(|history| history.lock().clone())
            .unwrap_or_default()
    }

    pub fn clear_history(&self) {
        if let Some(history) = &self.history {
            history.lock().clear();
        }
    }

    /// Number of handlers currently listening on `topic`.
    pub fn listener_count(&self, topic: &str) -> usize {
        self.handlers.handler_count(topic)
    }
}

impl Channel for LocalChannel {
    fn on(&self, topic: &str, handler: ChannelHandler) -> HandlerId {
        self.handlers.insert(topic, handler)
    }

    fn off(&self, topic: &str, handler: HandlerId) {
        self.handlers.remove(topic, handler);
    }

    fn emit(&self, topic: &str, message: Value) {
        if let Some(history) = &self.history {
            history.lock().push(EmittedMessage {
                topic: topic.to_string(),
                message: message.clone(),
            });
        }
        self.handlers.dispatch(topic, &message);
    }
}
