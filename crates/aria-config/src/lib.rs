//! # aria-config
//!
//! Configuration for the Aria assistant. Reads from `aria.toml` and environment
//! variables, in that precedence order for settings; API keys in the file win
//! over the environment.

pub mod schema;
pub mod loader;

pub use schema::AriaConfig;
pub use schema::{
    ConfigWarning, GenerationConfig, LoggingConfig, MemoryConfig, ProviderConfig, ProviderKind,
    ServicesConfig, StreamConfig, WarningSeverity,
};
pub use loader::ConfigLoader;
