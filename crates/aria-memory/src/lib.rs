//! # aria-memory
//!
//! Long-term memory for the assistant:
//!
//! - **Memory entries**: every completed turn and every ingestion step, keyed by
//!   user, with an optional embedding for similarity recall (SQLite, append-only).
//! - **User profiles**: identity, display name, and selected personality.
//!
//! Recall is an exact linear scan over the user's entries ordered by Euclidean
//! distance, comparing only embeddings from the same embedding space.

pub mod store;
pub mod users;
pub mod vector;

pub use store::{MemoryBackend, SqliteMemoryStore};
pub use users::UserStore;
