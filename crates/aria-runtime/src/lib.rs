//! # aria-runtime
//!
//! The assistant runtime: turns a user message into a recorded, streamed
//! response.
//!
//! ## Architecture
//!
//! ```text
//!              ┌──────────────┐
//!              │ ChatService  │  ← resolves the user, wires the sink
//!              └──────┬───────┘
//!                     │ generate / ingest_file
//!                     ▼
//!              ┌──────────────┐
//!              │  Assistant   │
//!              │              │
//!              │  1. Embed    │  ← Provider
//!              │  2. Recall   │  ← Memory store (optional)
//!              │  3. Tools    │  ← Bing search, ...
//!              │  4. Compose  │  ← Personality
//!              │  5. Stream   │  ← Provider → sink → StreamFanout
//!              │  6. Remember │  ← Memory store
//!              └──────────────┘
//! ```

pub mod assistant;
pub mod service;
pub mod tools;

pub use assistant::{Assistant, AssistantConfig, GenerateOptions, TurnStage, compose_prompt};
pub use service::ChatService;
pub use tools::{BingSearchTool, build_tools};
