//! Mock provider for deterministic testing.
//!
//! Replays pre-configured fragment scripts without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use aria_core::{AriaError, FileUpload, Result};

use crate::provider::*;

/// A mock provider that streams pre-configured responses.
///
/// # Example
/// ```
/// use aria_llm::MockProvider;
/// let provider = MockProvider::new().with_fragments(&["He", "llo!"]);
/// ```
#[derive(Clone)]
pub struct MockProvider {
    scripts: Arc<Mutex<VecDeque<MockScript>>>,
    extractions: Arc<Mutex<VecDeque<std::result::Result<String, String>>>>,
    embed_error: Arc<Mutex<Option<String>>>,
    /// Every prompt passed to `generate`, in call order.
    prompts: Arc<Mutex<Vec<String>>>,
    /// Every text passed to `embed`, in call order.
    embedded: Arc<Mutex<Vec<String>>>,
    dims: usize,
}

/// One queued response from the mock provider.
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    pub fragments: Vec<String>,
    /// If set, sent as a stream error after the fragments.
    pub error: Option<String>,
    /// Pause before each fragment.
    pub delay: Option<Duration>,
}

impl MockScript {
    pub fn fragments(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            extractions: Arc::new(Mutex::new(VecDeque::new())),
            embed_error: Arc::new(Mutex::new(None)),
            prompts: Arc::new(Mutex::new(Vec::new())),
            embedded: Arc::new(Mutex::new(Vec::new())),
            dims: 8,
        }
    }

    /// Queue a response streamed as exactly these fragments.
    pub fn with_fragments(self, fragments: &[&str]) -> Self {
        self.with_script(MockScript::fragments(fragments))
    }

    /// Queue a response that fails after streaming `fragments`.
    pub fn with_stream_error(self, fragments: &[&str], error: &str) -> Self {
        self.with_script(MockScript {
            error: Some(error.to_string()),
            ..MockScript::fragments(fragments)
        })
    }

    /// Queue a fully custom response.
    pub fn with_script(self, script: MockScript) -> Self {
        self.scripts.lock().push_back(script);
        self
    }

    /// Queue the text returned by the next `extract_text` call.
    pub fn with_extraction(self, text: &str) -> Self {
        self.extractions.lock().push_back(Ok(text.to_string()));
        self
    }

    /// Make the next `extract_text` call fail.
    pub fn with_extraction_error(self, error: &str) -> Self {
        self.extractions.lock().push_back(Err(error.to_string()));
        self
    }

    /// Make every `embed` call fail.
    pub fn with_embed_error(self, error: &str) -> Self {
        *self.embed_error.lock() = Some(error.to_string());
        self
    }

    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dims = dims.max(1);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn embedded_texts(&self) -> Vec<String> {
        self.embedded.lock().clone()
    }

    /// The vector `embed` returns for `text`: same text, same vector.
    pub fn embedding_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for (i, b) in text.bytes().enumerate() {
            v[i % self.dims] += b as f32 / 255.0;
        }
        v
    }

    fn next_script(&self) -> MockScript {
        self.scripts.lock().pop_front().unwrap_or_else(|| {
            MockScript::fragments(&["(mock: no more queued responses)"])
        })
    }
}

#[async_trait]
impl Embedder for MockProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedded.lock().push(text.to_string());
        if let Some(error) = self.embed_error.lock().clone() {
            return Err(AriaError::Embedding(error));
        }
        Ok(self.embedding_for(text))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn embedding_space(&self) -> String {
        embedding_space("mock", "mock-embedding", self.dims)
    }
}

#[async_trait]
impl Generator for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str) -> Result<mpsc::Receiver<StreamChunk>> {
        self.prompts.lock().push(prompt.to_string());
        let script = self.next_script();

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let output_tokens = script.fragments.len() as u32;
            for fragment in script.fragments {
                if let Some(delay) = script.delay {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(StreamChunk::Text(fragment)).await.is_err() {
                    return;
                }
            }

            if let Some(error) = script.error {
                let _ = tx.send(StreamChunk::Error(error)).await;
                return;
            }

            let _ = tx
                .send(StreamChunk::Usage(Usage {
                    input_tokens: 0,
                    output_tokens,
                }))
                .await;
            let _ = tx.send(StreamChunk::Done).await;
        });

        Ok(rx)
    }

    async fn extract_text(&self, file: &FileUpload) -> Result<String> {
        match self.extractions.lock().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(error)) => Err(AriaError::Extraction(error)),
            None => Ok(String::from_utf8_lossy(&file.bytes).into_owned()),
        }
    }
}
