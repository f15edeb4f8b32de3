//! Errors surfaced by stores and the registry.

use thiserror::Error;

use crate::actor::Actor;
use crate::store::StoreStatus;

/// Errors that can occur while creating or using a store.
///
/// Synchronous misuse (`Validation`, `NotReady`, `ReservedEventType`) is
/// returned at the call site. `SyncTimeout`, `LeaderConflict` and
/// `Disposed` surface through `until_ready()` and are terminal for the
/// instance; writes to a disposed store also return `Disposed`.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Invalid construction options.
    #[error("Invalid store options: {message}")]
    Validation { message: String },

    /// `set_state`/`send` called before the store reached `Ready`.
    #[error("Store '{id}' is not ready (status {status}); {actor} attempted {attempted}")]
    NotReady {
        id: String,
        status: StoreStatus,
        actor: Actor,
        attempted: String,
    },

    /// A follower found no leader within the sync window.
    #[error("No leader answered for store '{id}' within {timeout_ms}ms")]
    SyncTimeout { id: String, timeout_ms: u64 },

    /// Two leaders exist for the same store id.
    #[error("Multiple leaders detected for store '{id}': this {local}, other {remote}")]
    LeaderConflict {
        id: String,
        local: Actor,
        remote: Actor,
    },

    /// A store with this id exists with different state or event types.
    #[error("Store '{id}' already exists with different state or event types")]
    TypeMismatch { id: String },

    /// Custom events may not use the protocol's reserved discriminants.
    #[error("Event type '{event_type}' is reserved for internal store events")]
    ReservedEventType { event_type: String },

    /// The store was disposed.
    #[error("Store '{id}' was disposed")]
    Disposed { id: String },

    /// State or event could not be serialized for the channel.
    #[error("Failed to encode event for store '{id}': {message}")]
    Encode { id: String, message: String },
}

impl StoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation {
            message: message.into(),
        }
    }

    /// Whether the error leaves the instance permanently unusable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StoreError::SyncTimeout { .. }
                | StoreError::LeaderConflict { .. }
                | StoreError::Disposed { .. }
        )
    }
}
