//! # aria-llm
//!
//! Abstraction layer over language-model backends. Each provider offers three
//! capabilities: embedding text, streaming a generated response fragment by
//! fragment, and extracting readable text from an uploaded file.

pub mod gemini;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod sse;

pub use gemini::GeminiProvider;
pub use mock::MockProvider;
pub use openai::OpenAiProvider;
pub use provider::{Embedder, Generator, Provider, StreamChunk, Usage, embedding_space};
