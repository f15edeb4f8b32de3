use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::event::{EventInfo, StoreEvent};

/// Callback receiving store events together with their provenance.
pub type Listener<S, E> = Arc<dyn Fn(&StoreEvent<S, E>, &EventInfo) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ListenerKey {
    All,
    EventType(String),
}

pub(crate) struct ListenerRegistry<S, E> {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<ListenerKey, Vec<(u64, Listener<S, E>)>>>,
}

impl<S, E> ListenerRegistry<S, E>
where
    S: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            listeners: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn add(self: &Arc<Self>, key: ListenerKey, listener: Listener<S, E>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .entry(key.clone())
            .or_default()
            .push((id, listener));

        let registry: Weak<Self> = Arc::downgrade(self);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.remove(&key, id);
                }
            })),
        }
    }

    fn remove(&self, key: &ListenerKey, id: u64) {
        let mut listeners = self.listeners.lock();
        if let Some(entries) = listeners.get_mut(key) {
            entries.retain(|(entry_id, _)| *entry_id != id);
            if entries.is_empty() {
                listeners.remove(key);
            }
        }
    }

    /// Invoke listeners for `event`: type-specific ones first, then wildcards.
    ///
    /// Listeners run without the registry lock held, so they may subscribe
    /// or unsubscribe from inside the callback.
    pub(crate) fn emit(&self, event_type: &str, event: &StoreEvent<S, E>, info: &EventInfo) {
        let targets: Vec<Listener<S, E>> = {
            let listeners = self.listeners.lock();
            let typed = listeners.get(&ListenerKey::EventType(event_type.to_string()));
            let wildcard = listeners.get(&ListenerKey::All);
            typed
                .into_iter()
                .chain(wildcard)
                .flatten()
                .map(|(_, listener)| listener.clone())
                .collect()
        };

        for listener in targets {
            listener(event, info);
        }
    }

    pub(crate) fn clear(&self) {
        self.listeners.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().values().map(Vec::len).sum()
    }
}

/// Handle returned by subscriptions.
///
/// Dropping it leaves the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}
