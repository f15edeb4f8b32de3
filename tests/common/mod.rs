//! Shared test utilities: state types and simulated environments.

#![allow(dead_code, unused_imports)]

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use universal_store::{
    ChannelHub, CustomEvent, EnvironmentId, LocalChannel, RuntimeContext, StoreOptions,
    StoreRegistry, UniversalStore,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub count: i64,
    #[serde(default)]
    pub label: String,
}

impl Counter {
    pub fn new(count: i64) -> Self {
        Self {
            count,
            label: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum AppEvent {
    #[serde(rename = "GREETING")]
    Greeting { text: String },
    #[serde(rename = "RESET_REQUESTED")]
    ResetRequested,
    /// Collides with a protocol discriminant; sending it must fail.
    #[serde(rename = "__SET_STATE")]
    Impostor,
}

impl CustomEvent for AppEvent {
    fn event_type(&self) -> &str {
        match self {
            AppEvent::Greeting { .. } => "GREETING",
            AppEvent::ResetRequested => "RESET_REQUESTED",
            AppEvent::Impostor => "__SET_STATE",
        }
    }
}

pub type CounterStore = Arc<UniversalStore<Counter, AppEvent>>;

/// One simulated environment: its own runtime context and registry.
pub struct Environment {
    pub environment: EnvironmentId,
    pub registry: StoreRegistry,
}

impl Environment {
    /// An environment whose binding has not resolved yet.
    pub fn unbound(environment: EnvironmentId) -> Self {
        Self {
            environment,
            registry: StoreRegistry::new(RuntimeContext::new()),
        }
    }

    /// An environment bound to a shared synchronous channel.
    pub fn local(channel: &Arc<LocalChannel>, environment: EnvironmentId) -> Self {
        let env = Self::unbound(environment);
        env.bind_local(channel);
        env
    }

    /// An environment bound to its own endpoint of `hub`.
    pub fn bridged(hub: &ChannelHub, environment: EnvironmentId) -> Self {
        let env = Self::unbound(environment);
        env.registry
            .runtime()
            .bind(hub.connect(&environment.to_string()), environment);
        env
    }

    pub fn bind_local(&self, channel: &Arc<LocalChannel>) {
        self.registry.runtime().bind(channel.clone(), self.environment);
    }

    pub fn leader(&self, id: &str, count: i64) -> CounterStore {
        self.registry
            .create_or_reuse(StoreOptions::leader(id).with_initial_state(Counter::new(count)))
            .expect("leader options are valid")
    }

    pub fn follower(&self, id: &str) -> CounterStore {
        self.registry
            .create_or_reuse(StoreOptions::follower(id))
            .expect("follower options are valid")
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Let asynchronous deliveries settle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
