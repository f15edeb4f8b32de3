//! Simulated cross-process channel.
//!
//! Every endpoint connected to a [`ChannelHub`] behaves like a separate
//! process: emitted messages are serialized to JSON text and delivered
//! asynchronously to every *other* endpoint by a per-endpoint pump task.
//! Messages from one sender arrive in emission order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{Channel, ChannelHandler, HandlerId, HandlerTable};

struct Frame {
    topic: String,
    payload: String,
}

struct HubShared {
    next_endpoint: AtomicU64,
    endpoints: RwLock<Vec<(u64, mpsc::UnboundedSender<Frame>)>>,
}

/// Broadcast bus connecting [`BridgedChannel`] endpoints.
#[derive(Clone)]
pub struct ChannelHub {
    shared: Arc<HubShared>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(HubShared {
                next_endpoint: AtomicU64::new(0),
                endpoints: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Connect a new endpoint.
    ///
    /// Must be called from within a tokio runtime: the endpoint's delivery
    /// pump is spawned onto it.
    pub fn connect(&self, label: &str) -> Arc<BridgedChannel> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Frame>();
        let endpoint = self.shared.next_endpoint.fetch_add(1, Ordering::Relaxed);
        self.shared.endpoints.write().push((endpoint, sender));

        let handlers = Arc::new(HandlerTable::default());
        let pump_handlers = handlers.clone();
        let pump_label = label.to_string();
        tokio::spawn(async move {
            while let Some(frame) = receiver.recv().await {
                match serde_json::from_str::<Value>(&frame.payload) {
                    Ok(message) => pump_handlers.dispatch(&frame.topic, &message),
                    Err(err) => {
                        tracing::warn!(
                            endpoint = %pump_label,
                            topic = %frame.topic,
                            error = %err,
                            "Dropping undecodable bridge frame"
                        );
                    }
                }
            }
            tracing::trace!(endpoint = %pump_label, "Bridge endpoint pump stopped");
        });

        tracing::debug!(endpoint = %label, "Bridge endpoint connected");

        Arc::new(BridgedChannel {
            endpoint,
            label: label.to_string(),
            handlers,
            hub: self.shared.clone(),
        })
    }

    /// Number of currently connected endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.shared.endpoints.read().len()
    }
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One endpoint of a [`ChannelHub`].
pub struct BridgedChannel {
    endpoint: u64,
    label: String,
    handlers: Arc<HandlerTable>,
    hub: Arc<HubShared>,
}

impl BridgedChannel {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Stop receiving messages. Frames already queued are still delivered.
    pub fn disconnect(&self) {
        self.hub
            .endpoints
            .write()
            .retain(|(endpoint, _)| *endpoint != self.endpoint);
        tracing::debug!(endpoint = %self.label, "Bridge endpoint disconnected");
    }
}

impl Channel for BridgedChannel {
    fn on(&self, topic: &str, handler: ChannelHandler) -> HandlerId {
        self.handlers.insert(topic, handler)
    }

    fn off(&self, topic: &str, handler: HandlerId) {
        self.handlers.remove(topic, handler);
    }

    fn emit(&self, topic: &str, message: Value) {
        let payload = message.to_string();
        let endpoints = self.hub.endpoints.read();
        for (endpoint, sender) in endpoints.iter() {
            if *endpoint == self.endpoint {
                continue;
            }
            let frame = Frame {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            if sender.send(frame).is_err() {
                tracing::trace!(
                    from = %self.label,
                    "Bridge frame dropped (endpoint pump gone)"
                );
            }
        }
    }
}
