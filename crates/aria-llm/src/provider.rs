use async_trait::async_trait;
use aria_core::{AriaError, FileUpload, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A chunk of a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Next fragment of generated text.
    Text(String),
    /// Usage stats (sent at end of stream when the backend reports them).
    Usage(Usage),
    /// Stream is done.
    Done,
    /// An error occurred mid-stream. Nothing follows it.
    Error(String),
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Identifier of the vector space an embedding lives in.
///
/// Embeddings are only comparable when produced by the same model at the
/// same dimensionality.
pub fn embedding_space(provider: &str, model: &str, dims: usize) -> String {
    format!("{provider}:{model}:{dims}")
}

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text. Upstream failures surface as `AriaError::Embedding`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// The dimensionality of the output embeddings.
    fn dimensions(&self) -> usize;

    /// See [`embedding_space`].
    fn embedding_space(&self) -> String;
}

/// Streams generated text and extracts text from files.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Human-readable name, e.g. "gemini", "openai".
    fn name(&self) -> &str;

    /// Start generating a response. Returns a receiver for chunks.
    ///
    /// The sequence is finite and not restartable. Text chunks concatenated in
    /// order form the complete response.
    async fn generate(&self, prompt: &str) -> Result<mpsc::Receiver<StreamChunk>>;

    /// Extract readable text from raw file bytes. Failures surface as
    /// `AriaError::Extraction`.
    async fn extract_text(&self, file: &FileUpload) -> Result<String>;

    /// Non-streaming equivalent of [`Generator::generate`]. A stream that closes
    /// before `Done` fails with `AriaError::Generation`, as a streaming consumer sees it.
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut rx = self.generate(prompt).await?;
        let mut text = String::new();
        while let Some(chunk) = rx.recv().await {
            match chunk {
                StreamChunk::Text(fragment) => text.push_str(&fragment),
                StreamChunk::Usage(_) => {}
                StreamChunk::Done => return Ok(text),
                StreamChunk::Error(e) => return Err(AriaError::Generation(e)),
            }
        }
        Err(AriaError::Generation("stream ended without completing".into()))
    }
}

/// A complete backend: everything the assistant needs from a model vendor.
pub trait Provider: Embedder + Generator {}

impl<T: Embedder + Generator + ?Sized> Provider for T {}

/// Build an error message from a non-success HTTP response.
pub(crate) async fn http_failure(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let body: String = body.chars().take(500).collect();
    format!("HTTP {status}: {body}")
}

pub(crate) fn parse_vector(values: &serde_json::Value) -> Option<Vec<f32>> {
    values
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
}

/// Reject embeddings that do not match the configured dimensionality.
pub(crate) fn check_dimensions(embedding: Vec<f32>, expected: usize) -> Result<Vec<f32>> {
    if embedding.is_empty() {
        return Err(AriaError::Embedding("empty embedding returned".into()));
    }
    if embedding.len() != expected {
        return Err(AriaError::Embedding(format!(
            "expected {expected} dimensions, got {}",
            embedding.len()
        )));
    }
    Ok(embedding)
}
