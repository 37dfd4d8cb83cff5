//! # aria-cli
//!
//! Command-line interface for the Aria assistant.
//!
//! ## Commands
//!
//! - `aria profile`: Create a user or change their personality
//! - `aria chat`: Talk to the assistant, streaming the answer live
//! - `aria ingest`: Upload a file into a user's memory and summarise it
//! - `aria history`: Show a user's visible history
//! - `aria personalities`: List the available personalities
//! - `aria config`: Show the resolved configuration

pub mod commands;

pub use commands::Cli;
