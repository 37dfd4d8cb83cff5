//! # aria-core
//!
//! Core types, traits, and primitives for the Aria assistant.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! the error taxonomy, memory records, personalities, the tool capability, and the
//! per-user fragment fan-out.

pub mod error;
pub mod fanout;
pub mod personality;
pub mod tool;
pub mod types;

pub use error::{AriaError, ErrorKind, Result};
pub use fanout::{FragmentHandler, StreamFanout, SubscriptionHandle};
pub use personality::Personality;
pub use tool::{Tool, ToolOutcome};
pub use types::*;
