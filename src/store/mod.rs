//! Replicated store instance and its leader/follower protocol.
//!
//! Every process holding a store for a given id owns one instance. Exactly
//! one of them is the leader: it owns canonical state, answers existing
//! state requests and relays every other event with itself as forwarding
//! actor. Followers request the leader's state once the runtime binding
//! resolves and then mirror every `SetState` they observe.
//!
//! Inbound channel messages are queued per instance and processed one at a
//! time in arrival order, even when the channel delivers re-entrantly.
//! Every state transition, local or inbound, appends its listener
//! deliveries and channel messages to a per-instance outbox while the state
//! lock is held. The outbox is drained by one caller at a time, so emission
//! order always matches the order in which state was committed.

mod listeners;
mod options;
mod readiness;
mod timer;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;

use crate::actor::{Actor, ActorId, ActorRole};
use crate::channel::{Channel, HandlerId};
use crate::error::StoreError;
use crate::event::{
    is_reserved, topic_for, ChannelEnvelope, CustomEvent, EventInfo, NoCustomEvents, StoreEvent,
    StoreState, SET_STATE,
};
use crate::runtime::{RuntimeBinding, RuntimeContext};

pub use listeners::{Listener, Subscription};
pub use options::StoreOptions;

use listeners::{ListenerKey, ListenerRegistry};
use readiness::Readiness;
use timer::SyncTimer;

/// How long a follower waits for a leader's existing state.
pub const SYNC_TIMEOUT: Duration = Duration::from_millis(1000);

/// Lifecycle status of a store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreStatus {
    /// Runtime binding not resolved yet.
    Unprepared,
    /// Follower waiting for the leader's existing state.
    Syncing,
    Ready,
    /// Terminal. Reached on sync timeout, leader conflict or disposal.
    Error,
}

impl std::fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StoreStatus::Unprepared => "UNPREPARED",
            StoreStatus::Syncing => "SYNCING",
            StoreStatus::Ready => "READY",
            StoreStatus::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Work produced by a state transition, delivered after the state lock is
/// released.
enum Outgoing<S, E> {
    Local(StoreEvent<S, E>, EventInfo),
    Remote(Value),
}

struct StoreCore<S, E> {
    state: Option<S>,
    status: StoreStatus,
    outbox: VecDeque<Outgoing<S, E>>,
    flushing: bool,
}

struct Inbox<S, E> {
    queue: VecDeque<ChannelEnvelope<S, E>>,
    draining: bool,
}

struct Attachment {
    channel: Arc<dyn Channel>,
    handler: HandlerId,
    timer: Option<SyncTimer>,
}

enum Update<S, F> {
    Replace(S),
    Apply(F),
}

/// One replica of a logical store.
///
/// Created through [`crate::StoreRegistry::create_or_reuse`].
pub struct UniversalStore<S, E = NoCustomEvents> {
    id: String,
    topic: String,
    debug: bool,
    actor_id: ActorId,
    actor: RwLock<Actor>,
    core: Mutex<StoreCore<S, E>>,
    listeners: Arc<ListenerRegistry<S, E>>,
    readiness: Readiness,
    inbox: Mutex<Inbox<S, E>>,
    attachment: Mutex<Option<Attachment>>,
    disposed: AtomicBool,
}

impl<S: StoreState, E: CustomEvent> UniversalStore<S, E> {
    /// Options must already be validated.
    pub(crate) fn new(options: StoreOptions<S>) -> Self {
        let role = if options.leader {
            ActorRole::Leader
        } else {
            ActorRole::Follower
        };
        let actor = Actor::new(role);

        Self {
            topic: topic_for(&options.id),
            id: options.id,
            debug: options.debug,
            actor_id: actor.id.clone(),
            actor: RwLock::new(actor),
            core: Mutex::new(StoreCore {
                state: options.initial_state,
                status: StoreStatus::Unprepared,
                outbox: VecDeque::new(),
                flushing: false,
            }),
            listeners: ListenerRegistry::new(),
            readiness: Readiness::new(),
            inbox: Mutex::new(Inbox {
                queue: VecDeque::new(),
                draining: false,
            }),
            attachment: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Schedule preparation for when the runtime binding resolves.
    pub(crate) fn prepare_when_bound(self: &Arc<Self>, runtime: &RuntimeContext) {
        let store = Arc::downgrade(self);
        runtime.when_bound(move |binding| {
            if let Some(store) = store.upgrade() {
                store.prepare(binding);
            }
        });
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn actor(&self) -> Actor {
        self.actor.read().clone()
    }

    pub fn status(&self) -> StoreStatus {
        self.core.lock().status
    }

    /// Current state, or `None` unless the store is `Ready`.
    pub fn get_state(&self) -> Option<S> {
        let core = self.core.lock();
        match core.status {
            StoreStatus::Ready => core.state.clone(),
            _ => None,
        }
    }

    /// Replace the state and broadcast the change.
    pub fn set_state(&self, state: S) -> Result<(), StoreError> {
        self.commit(Update::<S, fn(&S) -> S>::Replace(state))
    }

    /// Derive the next state from the current one and broadcast the change.
    ///
    /// `updater` runs while the state lock is held and must not call back
    /// into this store.
    pub fn update_state(&self, updater: impl FnOnce(&S) -> S) -> Result<(), StoreError> {
        self.commit(Update::Apply(updater))
    }

    /// Broadcast an application event to local listeners and all replicas.
    pub fn send(&self, event: E) -> Result<(), StoreError> {
        if is_reserved(event.event_type()) {
            return Err(StoreError::ReservedEventType {
                event_type: event.event_type().to_string(),
            });
        }
        self.ensure_live()?;

        let actor = self.actor();
        {
            let mut core = self.core.lock();
            if core.status != StoreStatus::Ready {
                return Err(self.not_ready(core.status, actor, format!("send {}", describe(&event))));
            }

            let event = StoreEvent::Custom(event);
            let info = EventInfo::from_actor(actor);
            let message = self.encode(&event, &info)?;
            core.outbox.push_back(Outgoing::Local(event, info));
            core.outbox.push_back(Outgoing::Remote(message));
        }

        self.flush();
        Ok(())
    }

    /// Listen to every event.
    pub fn subscribe(
        &self,
        listener: impl Fn(&StoreEvent<S, E>, &EventInfo) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.add(ListenerKey::All, Arc::new(listener))
    }

    /// Listen to events with one discriminant.
    pub fn subscribe_to(
        &self,
        event_type: &str,
        listener: impl Fn(&StoreEvent<S, E>, &EventInfo) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.add(
            ListenerKey::EventType(event_type.to_string()),
            Arc::new(listener),
        )
    }

    /// Listen to state changes, local or replicated.
    ///
    /// A follower that adopts the leader's existing state also reports it
    /// here, as a `SetState` attributed to the leader with no previous
    /// state. That notification is synthesized locally: it did not travel
    /// over the channel, and subscribers of the raw
    /// `__EXISTING_STATE_RESPONSE` event still receive the response itself.
    pub fn on_state_change(
        &self,
        listener: impl Fn(&S, Option<&S>, &EventInfo) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe_to(SET_STATE, move |event, info| {
            if let StoreEvent::SetState {
                state,
                previous_state,
            } = event
            {
                listener(state, previous_state.as_ref(), info);
            }
        })
    }

    /// Listen to changes of a projection of the state.
    ///
    /// The listener only fires when `selector` yields a different value for
    /// the new state than for the previous one.
    pub fn on_state_change_with<T, F, L>(&self, selector: F, listener: L) -> Subscription
    where
        T: PartialEq,
        F: Fn(&S) -> T + Send + Sync + 'static,
        L: Fn(&T, Option<&T>, &EventInfo) + Send + Sync + 'static,
    {
        self.on_state_change(move |state, previous, info| {
            let next = selector(state);
            let previous = previous.map(|previous| selector(previous));
            if previous.as_ref() == Some(&next) {
                return;
            }
            listener(&next, previous.as_ref(), info);
        })
    }

    /// Wait until the store is bound and synchronized.
    pub async fn until_ready(&self) -> Result<(), StoreError> {
        self.readiness.wait().await
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Detach from the channel, cancel pending synchronization and drop
    /// all listeners. The store ends in `Error` and rejects further writes
    /// with [`StoreError::Disposed`]. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut core = self.core.lock();
            core.status = StoreStatus::Error;
            core.outbox.clear();
        }

        let attachment = self.attachment.lock().take();
        if let Some(attachment) = attachment {
            attachment.channel.off(&self.topic, attachment.handler);
            if let Some(timer) = attachment.timer {
                timer.cancel();
            }
        }

        self.readiness.fail(StoreError::Disposed {
            id: self.id.clone(),
        });
        self.listeners.clear();
        self.trace("Store disposed");
    }

    fn prepare(self: &Arc<Self>, binding: RuntimeBinding) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        self.actor.write().environment = binding.environment;

        let store = Arc::downgrade(self);
        let handler = binding.channel.on(
            &self.topic,
            Arc::new(move |message: &Value| {
                if let Some(store) = store.upgrade() {
                    store.handle_message(message);
                }
            }),
        );
        *self.attachment.lock() = Some(Attachment {
            channel: binding.channel.clone(),
            handler,
            timer: None,
        });

        let actor = self.actor();
        let info = EventInfo::from_actor(actor.clone());

        if actor.is_leader() {
            {
                let mut core = self.core.lock();
                core.status = StoreStatus::Ready;
                self.enqueue_remote(&mut core, &StoreEvent::LeaderCreated, &info);
            }
            self.readiness.settle(Ok(()));
            tracing::info!(store_id = %self.id, actor = %actor, "Leader ready");
            self.flush();
            return;
        }

        let store = Arc::downgrade(self);
        let timer = SyncTimer::start(SYNC_TIMEOUT, move || {
            if let Some(store) = store.upgrade() {
                store.sync_timed_out();
            }
        });
        if let Some(attachment) = self.attachment.lock().as_mut() {
            attachment.timer = Some(timer);
        }

        {
            let mut core = self.core.lock();
            core.status = StoreStatus::Syncing;
            self.enqueue_remote(&mut core, &StoreEvent::FollowerCreated, &info);
            self.enqueue_remote(&mut core, &StoreEvent::ExistingStateRequest, &info);
        }
        self.trace("Follower requesting existing state");
        self.flush();
    }

    fn commit<F: FnOnce(&S) -> S>(&self, update: Update<S, F>) -> Result<(), StoreError> {
        self.ensure_live()?;

        let actor = self.actor();
        {
            let mut core = self.core.lock();
            if core.status != StoreStatus::Ready {
                let attempted = match &update {
                    Update::Replace(state) => format!("set_state {}", describe(state)),
                    Update::Apply(_) => "update_state".to_string(),
                };
                return Err(self.not_ready(core.status, actor, attempted));
            }

            let next = match update {
                Update::Replace(state) => state,
                Update::Apply(updater) => match core.state.as_ref() {
                    Some(previous) => updater(previous),
                    None => {
                        return Err(StoreError::validation(format!(
                            "store '{}' has no state to update",
                            self.id
                        )))
                    }
                },
            };

            let event = StoreEvent::SetState {
                state: next.clone(),
                previous_state: core.state.clone(),
            };
            let info = EventInfo::from_actor(actor);
            let message = self.encode(&event, &info)?;
            core.state = Some(next);
            core.outbox.push_back(Outgoing::Local(event, info));
            core.outbox.push_back(Outgoing::Remote(message));
        }

        self.flush();
        self.trace("State updated");
        Ok(())
    }

    fn handle_message(&self, message: &Value) {
        let envelope = match ChannelEnvelope::<S, E>::decode(message) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(
                    store_id = %self.id,
                    error = %err,
                    "Dropping undecodable store message"
                );
                return;
            }
        };

        if self.is_own(&envelope.event_info) {
            return;
        }

        {
            let mut inbox = self.inbox.lock();
            inbox.queue.push_back(envelope);
            if inbox.draining {
                return;
            }
            inbox.draining = true;
        }

        loop {
            let next = {
                let mut inbox = self.inbox.lock();
                match inbox.queue.pop_front() {
                    Some(envelope) => envelope,
                    None => {
                        inbox.draining = false;
                        return;
                    }
                }
            };
            self.process(next);
        }
    }

    fn is_own(&self, info: &EventInfo) -> bool {
        info.actor.id == self.actor_id
            || info
                .forwarding_actor
                .as_ref()
                .is_some_and(|forwarder| forwarder.id == self.actor_id)
    }

    fn process(&self, envelope: ChannelEnvelope<S, E>) {
        let ChannelEnvelope { event, event_info } = envelope;
        let local = self.actor();
        let origin = event_info.actor;
        let mut synced = false;
        let mut conflict = false;

        {
            let mut core = self.core.lock();
            if core.status == StoreStatus::Error {
                drop(core);
                self.trace("Discarding inbound event, store is in error state");
                return;
            }

            if local.is_leader() {
                match &event {
                    StoreEvent::ExistingStateRequest => {
                        let response = StoreEvent::ExistingStateResponse(core.state.clone());
                        self.enqueue_remote(
                            &mut core,
                            &response,
                            &EventInfo::from_actor(local.clone()),
                        );
                    }
                    StoreEvent::LeaderCreated => {
                        core.status = StoreStatus::Error;
                        conflict = true;
                    }
                    _ => {
                        // Own state first so a concurrent local write
                        // commits after the relayed one.
                        if let StoreEvent::SetState { state, .. } = &event {
                            core.state = Some(state.clone());
                        }
                        let forwarded = EventInfo {
                            actor: origin.clone(),
                            forwarding_actor: Some(local.clone()),
                        };
                        self.enqueue_remote(&mut core, &event, &forwarded);
                    }
                }
            } else {
                // Followers only trust follower traffic relayed by the
                // leader; the direct copy would otherwise be applied twice.
                if event_info.forwarding_actor.is_none() && origin.role == ActorRole::Follower {
                    return;
                }
                match &event {
                    StoreEvent::ExistingStateResponse(state)
                        if core.status == StoreStatus::Syncing =>
                    {
                        core.status = StoreStatus::Ready;
                        let previous = std::mem::replace(&mut core.state, state.clone());
                        synced = true;
                        if let Some(state) = state {
                            let adopted = StoreEvent::SetState {
                                state: state.clone(),
                                previous_state: previous,
                            };
                            core.outbox.push_back(Outgoing::Local(
                                adopted,
                                EventInfo::from_actor(origin.clone()),
                            ));
                        }
                    }
                    StoreEvent::SetState { state, .. } => core.state = Some(state.clone()),
                    _ => {}
                }
            }

            let info = EventInfo::from_actor(origin.clone());
            core.outbox.push_back(Outgoing::Local(event, info));
        }

        if synced {
            self.cancel_timer();
            self.readiness.settle(Ok(()));
            tracing::info!(
                store_id = %self.id,
                actor = %local,
                leader = %origin,
                "Follower synchronized with leader"
            );
        }
        if conflict {
            self.leader_conflict(local, &origin);
        }
        self.flush();
    }

    fn sync_timed_out(&self) {
        {
            let mut core = self.core.lock();
            if core.status != StoreStatus::Syncing {
                return;
            }
            core.status = StoreStatus::Error;
        }

        let error = StoreError::SyncTimeout {
            id: self.id.clone(),
            timeout_ms: SYNC_TIMEOUT.as_millis() as u64,
        };
        tracing::error!(
            store_id = %self.id,
            actor = %self.actor(),
            "No leader answered the existing state request; is a leader created for this id?"
        );
        self.readiness.settle(Err(error));
    }

    /// Status is already `Error` when this runs.
    fn leader_conflict(&self, local: Actor, remote: &Actor) {
        tracing::error!(
            store_id = %self.id,
            this = %local,
            other = %remote,
            "Detected multiple leaders for the same store id; stores are now in an invalid state"
        );

        self.readiness.fail(StoreError::LeaderConflict {
            id: self.id.clone(),
            local: local.clone(),
            remote: remote.clone(),
        });

        // Announce ourselves so the other leader detects the conflict too.
        let mut core = self.core.lock();
        self.enqueue_remote(
            &mut core,
            &StoreEvent::LeaderCreated,
            &EventInfo::from_actor(local),
        );
    }

    /// Deliver queued listener calls and channel messages in commit order.
    ///
    /// Only one caller drains at a time; a caller that finds the outbox
    /// already being drained (another thread, or a listener re-entering
    /// the store) returns and leaves its work to the active drainer.
    fn flush(&self) {
        {
            let mut core = self.core.lock();
            if core.flushing {
                return;
            }
            core.flushing = true;
        }

        loop {
            let next = {
                let mut core = self.core.lock();
                match core.outbox.pop_front() {
                    Some(next) => next,
                    None => {
                        core.flushing = false;
                        return;
                    }
                }
            };
            match next {
                Outgoing::Local(event, info) => {
                    self.listeners.emit(event.event_type(), &event, &info)
                }
                Outgoing::Remote(message) => self.emit_message(message),
            }
        }
    }

    fn ensure_live(&self) -> Result<(), StoreError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StoreError::Disposed {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    fn cancel_timer(&self) {
        if let Some(attachment) = self.attachment.lock().as_mut() {
            if let Some(timer) = attachment.timer.take() {
                timer.cancel();
            }
        }
    }

    fn encode(&self, event: &StoreEvent<S, E>, info: &EventInfo) -> Result<Value, StoreError> {
        ChannelEnvelope::new(event.clone(), info.clone())
            .encode()
            .map_err(|err| StoreError::Encode {
                id: self.id.clone(),
                message: err.to_string(),
            })
    }

    fn enqueue_remote(&self, core: &mut StoreCore<S, E>, event: &StoreEvent<S, E>, info: &EventInfo) {
        match self.encode(event, info) {
            Ok(message) => core.outbox.push_back(Outgoing::Remote(message)),
            Err(err) => tracing::error!(
                store_id = %self.id,
                event_type = %event.event_type(),
                error = %err,
                "Failed to emit store event"
            ),
        }
    }

    fn emit_message(&self, message: Value) {
        let channel = self
            .attachment
            .lock()
            .as_ref()
            .map(|attachment| attachment.channel.clone());
        match channel {
            Some(channel) => channel.emit(&self.topic, message),
            None => tracing::trace!(store_id = %self.id, "No channel attached, event stays local"),
        }
    }

    fn not_ready(&self, status: StoreStatus, actor: Actor, attempted: String) -> StoreError {
        StoreError::NotReady {
            id: self.id.clone(),
            status,
            actor,
            attempted,
        }
    }

    fn trace(&self, message: &str) {
        if !self.debug {
            return;
        }
        let (status, state) = {
            let core = self.core.lock();
            (core.status, core.state.as_ref().map(describe))
        };
        tracing::debug!(
            store_id = %self.id,
            actor = %self.actor(),
            status = %status,
            state = state.as_deref().unwrap_or("<unset>"),
            "{}",
            message
        );
    }
}

impl<S, E> std::fmt::Debug for UniversalStore<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniversalStore")
            .field("id", &self.id)
            .field("actor", &*self.actor.read())
            .field("status", &self.core.lock().status)
            .finish_non_exhaustive()
    }
}

fn describe<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<unserializable>".to_string())
}
