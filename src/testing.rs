//! Helpers for testing code that consumes stores.

use std::sync::Arc;

use crate::actor::EnvironmentId;
use crate::channel::LocalChannel;
use crate::error::StoreError;
use crate::event::{CustomEvent, StoreState};
use crate::registry::StoreRegistry;
use crate::runtime::RuntimeContext;
use crate::store::{StoreOptions, UniversalStore};

/// A ready leader store bound to its own private channel.
///
/// Useful for unit-testing components that read and write a store
/// without wiring up environments. The returned channel records every
/// emitted message.
pub fn mock_store<S, E>(
    id: &str,
    initial_state: S,
) -> Result<(Arc<UniversalStore<S, E>>, Arc<LocalChannel>), StoreError>
where
    S: StoreState,
    E: CustomEvent,
{
    let channel = LocalChannel::with_history();
    let runtime = RuntimeContext::new();
    runtime.bind(channel.clone(), EnvironmentId::Mock);

    let registry = StoreRegistry::new(runtime);
    let store = registry.create_or_reuse(StoreOptions::leader(id).with_initial_state(initial_state))?;
    Ok((store, channel))
}
