//! Configuration loading for processes hosting stores.

mod loader;
mod types;

pub use loader::ConfigError;
pub use types::{Config, LoggingConfig, RuntimeConfig, StoreDefaults};
