use crate::error::StoreError;

/// Construction options for a store.
///
/// `initial_state` is only meaningful for a leader; followers always
/// inherit state from the leader and are rejected if one is supplied.
#[derive(Debug, Clone)]
pub struct StoreOptions<S> {
    pub id: String,
    pub leader: bool,
    pub initial_state: Option<S>,
    pub debug: bool,
}

impl<S> StoreOptions<S> {
    pub fn leader(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            leader: true,
            initial_state: None,
            debug: false,
        }
    }

    pub fn follower(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            leader: false,
            initial_state: None,
            debug: false,
        }
    }

    pub fn with_initial_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        if self.id.trim().is_empty() {
            return Err(StoreError::validation("store id must be a non-empty string"));
        }

        if !self.leader && self.initial_state.is_some() {
            return Err(StoreError::validation(format!(
                "store '{}' is a follower and cannot have an initial state; followers inherit state from the leader",
                self.id
            )));
        }

        Ok(())
    }
}
