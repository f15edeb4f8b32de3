//! Per-process store registry.
//!
//! Guarantees at most one local instance per store id. Asking for an id
//! that already exists returns the existing instance.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::event::{CustomEvent, StoreState};
use crate::runtime::RuntimeContext;
use crate::store::{StoreOptions, UniversalStore};

/// Type-erased view of a registered store.
trait RegisteredStore: Send + Sync {
    fn dispose_store(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<S: StoreState, E: CustomEvent> RegisteredStore for UniversalStore<S, E> {
    fn dispose_store(&self) {
        self.dispose();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

type AnyStore = Arc<dyn RegisteredStore>;

/// Owns every store instance created in this process.
pub struct StoreRegistry {
    runtime: RuntimeContext,
    stores: Mutex<HashMap<String, AnyStore>>,
}

impl StoreRegistry {
    pub fn new(runtime: RuntimeContext) -> Self {
        Self {
            runtime,
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub fn runtime(&self) -> &RuntimeContext {
        &self.runtime
    }

    /// Return the store for `options.id`, creating it if needed.
    ///
    /// Options are validated synchronously before anything else happens.
    /// Reusing an id logs a warning; the existing instance keeps its
    /// original role and state.
    pub fn create_or_reuse<S, E>(
        &self,
        options: StoreOptions<S>,
    ) -> Result<Arc<UniversalStore<S, E>>, StoreError>
    where
        S: StoreState,
        E: CustomEvent,
    {
        options.validate()?;

        let store = {
            let mut stores = self.stores.lock();
            if let Some(existing) = stores.get(&options.id) {
                tracing::warn!(
                    store_id = %options.id,
                    "Store already exists in this environment; reusing the existing instance"
                );
                return existing
                    .clone()
                    .into_any()
                    .downcast::<UniversalStore<S, E>>()
                    .map_err(|_| StoreError::TypeMismatch {
                        id: options.id.clone(),
                    });
            }

            let id = options.id.clone();
            let store = Arc::new(UniversalStore::<S, E>::new(options));
            stores.insert(id, store.clone() as AnyStore);
            store
        };

        tracing::debug!(
            store_id = %store.id(),
            role = %store.actor().role,
            "Store created"
        );

        // Outside the registry lock: preparation may deliver messages
        // synchronously to other stores.
        store.prepare_when_bound(&self.runtime);
        Ok(store)
    }

    /// Look up an existing store.
    pub fn get<S, E>(&self, id: &str) -> Option<Arc<UniversalStore<S, E>>>
    where
        S: StoreState,
        E: CustomEvent,
    {
        let existing = self.stores.lock().get(id).cloned()?;
        existing.into_any().downcast::<UniversalStore<S, E>>().ok()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.stores.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.lock().is_empty()
    }

    /// Dispose and forget a store. Returns `false` if no store had that id.
    pub fn dispose(&self, id: &str) -> bool {
        let removed = self.stores.lock().remove(id);
        match removed {
            Some(store) => {
                store.dispose_store();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorRole, EnvironmentId};
    use crate::channel::LocalChannel;
    use crate::event::NoCustomEvents;
    use crate::store::StoreStatus;

    type Counter = u32;

    fn registry() -> StoreRegistry {
        StoreRegistry::new(RuntimeContext::new())
    }

    #[test]
    fn validation_happens_before_creation() {
        let registry = registry();

        let empty = registry.create_or_reuse::<Counter, NoCustomEvents>(StoreOptions::leader(""));
        assert!(matches!(empty, Err(StoreError::Validation { .. })));

        let follower = registry.create_or_reuse::<Counter, NoCustomEvents>(
            StoreOptions::follower("a").with_initial_state(1),
        );
        assert!(matches!(follower, Err(StoreError::Validation { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn reuse_returns_the_same_instance() {
        let registry = registry();
        let first = registry
            .create_or_reuse::<Counter, NoCustomEvents>(
                StoreOptions::leader("a").with_initial_state(1),
            )
            .unwrap();
        let second = registry
            .create_or_reuse::<Counter, NoCustomEvents>(StoreOptions::follower("a"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.actor().role, ActorRole::Leader);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("a"));
        assert!(registry.get::<Counter, NoCustomEvents>("a").is_some());
    }

    #[test]
    fn reuse_with_other_types_is_an_error() {
        let registry = registry();
        registry
            .create_or_reuse::<Counter, NoCustomEvents>(StoreOptions::leader("a"))
            .unwrap();

        let other = registry.create_or_reuse::<String, NoCustomEvents>(StoreOptions::leader("a"));
        assert!(matches!(other, Err(StoreError::TypeMismatch { .. })));
        assert!(registry.get::<String, NoCustomEvents>("a").is_none());
    }

    #[test]
    fn stores_created_before_binding_prepare_on_bind() {
        let registry = registry();
        let store = registry
            .create_or_reuse::<Counter, NoCustomEvents>(
                StoreOptions::leader("a").with_initial_state(5),
            )
            .unwrap();
        assert_eq!(store.status(), StoreStatus::Unprepared);

        registry
            .runtime()
            .bind(LocalChannel::new(), EnvironmentId::Manager);
        assert_eq!(store.status(), StoreStatus::Ready);
        assert_eq!(store.get_state(), Some(5));
    }

    #[test]
    fn dispose_removes_the_store() {
        let registry = registry();
        registry
            .create_or_reuse::<Counter, NoCustomEvents>(StoreOptions::leader("a"))
            .unwrap();

        assert!(registry.dispose("a"));
        assert!(!registry.dispose("a"));
        assert!(registry.is_empty());
    }

    #[test]
    fn recreated_store_after_dispose_is_the_only_live_instance() {
        let channel = LocalChannel::new();
        let registry = registry();
        registry.runtime().bind(channel.clone(), EnvironmentId::Server);

        let first = registry
            .create_or_reuse::<Counter, NoCustomEvents>(
                StoreOptions::leader("a").with_initial_state(1),
            )
            .unwrap();
        assert!(registry.dispose("a"));
        assert_eq!(channel.listener_count("STORE:a"), 0);

        let second = registry
            .create_or_reuse::<Counter, NoCustomEvents>(
                StoreOptions::leader("a").with_initial_state(2),
            )
            .unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(channel.listener_count("STORE:a"), 1);
        assert_eq!(first.status(), StoreStatus::Error);
        assert_eq!(second.status(), StoreStatus::Ready);
        assert_eq!(second.get_state(), Some(2));
    }
}
