//! Cross-environment state synchronization.
//!
//! A *universal store* is one logical piece of state replicated between
//! isolated environments (a build server, a UI manager, a preview
//! renderer) that can only exchange serialized messages over a
//! publish/subscribe [`Channel`]. Per store id exactly one instance is
//! the leader; every other instance is a follower that requests the
//! leader's state when it starts and then mirrors every change the leader
//! relays.
//!
//! ```no_run
//! use std::sync::Arc;
//! use universal_store::{
//!     ChannelHub, EnvironmentId, NoCustomEvents, RuntimeContext, StoreOptions, StoreRegistry,
//! };
//!
//! # async fn run() -> Result<(), universal_store::StoreError> {
//! let hub = ChannelHub::new();
//!
//! let server = StoreRegistry::new(RuntimeContext::new());
//! server.runtime().bind(hub.connect("server"), EnvironmentId::Server);
//! let leader = server.create_or_reuse::<u32, NoCustomEvents>(
//!     StoreOptions::leader("env1:counter").with_initial_state(0),
//! )?;
//!
//! let manager = StoreRegistry::new(RuntimeContext::new());
//! manager.runtime().bind(hub.connect("manager"), EnvironmentId::Manager);
//! let follower: Arc<_> =
//!     manager.create_or_reuse::<u32, NoCustomEvents>(StoreOptions::follower("env1:counter"))?;
//!
//! follower.until_ready().await?;
//! leader.set_state(5)?;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod testing;
pub mod tracing_init;

pub use actor::{Actor, ActorId, ActorRole, EnvironmentId};
pub use channel::{BridgedChannel, Channel, ChannelHandler, ChannelHub, HandlerId, LocalChannel};
pub use error::StoreError;
pub use event::{ChannelEnvelope, CustomEvent, EventInfo, NoCustomEvents, StoreEvent, StoreState};
pub use registry::StoreRegistry;
pub use runtime::{RuntimeBinding, RuntimeContext};
pub use store::{StoreOptions, StoreStatus, Subscription, UniversalStore, SYNC_TIMEOUT};
