//! Event vocabulary and the channel envelope wire format.
//!
//! Every message on the channel is a JSON object of the form
//! `{ "event": { "type", "payload"? }, "eventInfo": { "actor", "forwardingActor"? } }`.
//! Five `__`-prefixed discriminants are reserved for the replication
//! protocol; everything else is an application-defined custom event.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::actor::Actor;

pub const TOPIC_PREFIX: &str = "STORE:";

pub const EXISTING_STATE_REQUEST: &str = "__EXISTING_STATE_REQUEST";
pub const EXISTING_STATE_RESPONSE: &str = "__EXISTING_STATE_RESPONSE";
pub const SET_STATE: &str = "__SET_STATE";
pub const LEADER_CREATED: &str = "__LEADER_CREATED";
pub const FOLLOWER_CREATED: &str = "__FOLLOWER_CREATED";

const RESERVED_EVENT_TYPES: [&str; 5] = [
    EXISTING_STATE_REQUEST,
    EXISTING_STATE_RESPONSE,
    SET_STATE,
    LEADER_CREATED,
    FOLLOWER_CREATED,
];

/// Channel topic carrying all traffic for one store id.
pub fn topic_for(store_id: &str) -> String {
    format!("{}{}", TOPIC_PREFIX, store_id)
}

/// Whether a discriminant belongs to the replication protocol.
pub fn is_reserved(event_type: &str) -> bool {
    RESERVED_EVENT_TYPES.contains(&event_type)
}

/// State that can be replicated between environments.
pub trait StoreState: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StoreState for T where T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{}

/// Application-defined event carried alongside the internal protocol events.
///
/// Implementors are expected to serialize as `{ "type": ..., "payload": ... }`,
/// which is what `#[serde(tag = "type", content = "payload")]` produces.
pub trait CustomEvent: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// String discriminant used for routing to listeners.
    fn event_type(&self) -> &str;
}

/// Custom event type for stores that only replicate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoCustomEvents {}

impl CustomEvent for NoCustomEvents {
    fn event_type(&self) -> &str {
        match *self {}
    }
}

/// Errors decoding or encoding a channel envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Event '{event_type}' is missing its payload")]
    MissingPayload { event_type: String },

    #[error("Custom event '{event_type}' must serialize as {{ \"type\", \"payload\" }}")]
    CustomShape { event_type: String },
}

/// An event flowing through a store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent<S, E> {
    ExistingStateRequest,
    ExistingStateResponse(Option<S>),
    SetState { state: S, previous_state: Option<S> },
    LeaderCreated,
    FollowerCreated,
    Custom(E),
}

impl<S: StoreState, E: CustomEvent> StoreEvent<S, E> {
    pub fn event_type(&self) -> &str {
        match self {
            StoreEvent::ExistingStateRequest => EXISTING_STATE_REQUEST,
            StoreEvent::ExistingStateResponse(_) => EXISTING_STATE_RESPONSE,
            StoreEvent::SetState { .. } => SET_STATE,
            StoreEvent::LeaderCreated => LEADER_CREATED,
            StoreEvent::FollowerCreated => FOLLOWER_CREATED,
            StoreEvent::Custom(event) => event.event_type(),
        }
    }

    fn to_wire(&self) -> Result<WireEvent, EnvelopeError> {
        let payload = match self {
            StoreEvent::ExistingStateRequest
            | StoreEvent::LeaderCreated
            | StoreEvent::FollowerCreated => None,
            StoreEvent::ExistingStateResponse(state) => Some(serde_json::to_value(state)?),
            StoreEvent::SetState {
                state,
                previous_state,
            } => Some(serde_json::to_value(SetStatePayloadRef {
                state,
                previous_state: previous_state.as_ref(),
            })?),
            StoreEvent::Custom(event) => return custom_to_wire(event),
        };

        Ok(WireEvent {
            event_type: self.event_type().to_string(),
            payload,
        })
    }

    fn from_wire(wire: WireEvent) -> Result<Self, EnvelopeError> {
        match wire.event_type.as_str() {
            EXISTING_STATE_REQUEST => Ok(StoreEvent::ExistingStateRequest),
            EXISTING_STATE_RESPONSE => {
                let state = match wire.payload {
                    Some(payload) => serde_json::from_value(payload)?,
                    None => None,
                };
                Ok(StoreEvent::ExistingStateResponse(state))
            }
            SET_STATE => {
                let payload = wire.payload.ok_or_else(|| EnvelopeError::MissingPayload {
                    event_type: SET_STATE.to_string(),
                })?;
                let payload: SetStatePayload<S> = serde_json::from_value(payload)?;
                Ok(StoreEvent::SetState {
                    state: payload.state,
                    previous_state: payload.previous_state,
                })
            }
            LEADER_CREATED => Ok(StoreEvent::LeaderCreated),
            FOLLOWER_CREATED => Ok(StoreEvent::FollowerCreated),
            _ => {
                let value = serde_json::to_value(&wire)?;
                Ok(StoreEvent::Custom(serde_json::from_value(value)?))
            }
        }
    }
}

fn custom_to_wire<E: CustomEvent>(event: &E) -> Result<WireEvent, EnvelopeError> {
    let value = serde_json::to_value(event)?;
    serde_json::from_value(value).map_err(|_| EnvelopeError::CustomShape {
        event_type: event.event_type().to_string(),
    })
}

/// Provenance attached to every event.
///
/// `forwarding_actor` is set only when a leader relays an event it did not
/// originate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    pub actor: Actor,
    #[serde(
        rename = "forwardingActor",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub forwarding_actor: Option<Actor>,
}

impl EventInfo {
    pub fn from_actor(actor: Actor) -> Self {
        Self {
            actor,
            forwarding_actor: None,
        }
    }
}

/// The unit exchanged over the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEnvelope<S, E> {
    pub event: StoreEvent<S, E>,
    pub event_info: EventInfo,
}

impl<S: StoreState, E: CustomEvent> ChannelEnvelope<S, E> {
    pub fn new(event: StoreEvent<S, E>, event_info: EventInfo) -> Self {
        Self { event, event_info }
    }

    pub fn encode(&self) -> Result<Value, EnvelopeError> {
        let wire = WireEnvelope {
            event: self.event.to_wire()?,
            event_info: self.event_info.clone(),
        };
        Ok(serde_json::to_value(wire)?)
    }

    pub fn decode(message: &Value) -> Result<Self, EnvelopeError> {
        let wire = WireEnvelope::deserialize(message)?;
        Ok(Self {
            event: StoreEvent::from_wire(wire.event)?,
            event_info: wire.event_info,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    event: WireEvent,
    #[serde(rename = "eventInfo")]
    event_info: EventInfo,
}

#[derive(Serialize)]
struct SetStatePayloadRef<'a, S> {
    state: &'a S,
    #[serde(rename = "previousState", skip_serializing_if = "Option::is_none")]
    previous_state: Option<&'a S>,
}

#[derive(Deserialize)]
struct SetStatePayload<S> {
    state: S,
    #[serde(rename = "previousState")]
    previous_state: Option<S>,
}
