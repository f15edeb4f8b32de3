//! Actor identities shared by every store replica.
//!
//! An actor is created once per store instance. Its environment is only
//! known after the runtime binding resolves, so it starts as `UNKNOWN`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally unique actor identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replication role of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Leader,
    Follower,
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorRole::Leader => write!(f, "LEADER"),
            ActorRole::Follower => write!(f, "FOLLOWER"),
        }
    }
}

/// Execution context an actor lives in.
///
/// Used for diagnostics only, never for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvironmentId {
    Server,
    Manager,
    Preview,
    Unknown,
    Mock,
}

impl std::fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EnvironmentId::Server => "SERVER",
            EnvironmentId::Manager => "MANAGER",
            EnvironmentId::Preview => "PREVIEW",
            EnvironmentId::Unknown => "UNKNOWN",
            EnvironmentId::Mock => "MOCK",
        };
        f.write_str(name)
    }
}

/// Identity of one store instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    #[serde(rename = "type")]
    pub role: ActorRole,
    pub environment: EnvironmentId,
}

impl Actor {
    /// Create a fresh actor whose environment is not yet known.
    pub fn new(role: ActorRole) -> Self {
        Self {
            id: ActorId::new(),
            role,
            environment: EnvironmentId::Unknown,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.role == ActorRole::Leader
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{} ({})", self.role, self.environment, self.id)
    }
}
