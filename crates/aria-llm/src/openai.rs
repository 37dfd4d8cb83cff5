use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info};

use aria_core::{AriaError, FileUpload, Result};

use crate::provider::*;
use crate::sse;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GENERATION_MODEL: &str = "gpt-4o";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";
/// `text-embedding-3-large` is truncated to this size so both providers share a dimensionality.
pub const DEFAULT_EMBEDDING_DIMS: usize = 768;

const EXTRACTION_INSTRUCTION: &str = "Extract all readable text from this file.";

/// OpenAI-compatible API provider (works with OpenAI, Azure, Together, etc.)
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    generation_model: String,
    embedding_model: String,
    dims: usize,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            generation_model: DEFAULT_GENERATION_MODEL.into(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.into(),
            dims: DEFAULT_EMBEDDING_DIMS,
        }
    }

    /// Use a custom base URL (for Azure, Together, vLLM, etc.)
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_generation_model(mut self, model: String) -> Self {
        self.generation_model = model;
        self
    }

    /// Use a specific embedding model at the given dimensionality.
    pub fn with_embedding_model(mut self, model: String, dims: usize) -> Self {
        self.embedding_model = model;
        self.dims = dims;
        self
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
    }
}

#[async_trait]
impl Embedder for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(model = %self.embedding_model, chars = text.len(), "generating embedding");

        let body = json!({
            "model": &self.embedding_model,
            "input": text,
            "dimensions": self.dims,
        });

        let resp = self
            .post("embeddings")
            .json(&body)
            .send()
            .await
            .map_err(|e| AriaError::Embedding(format!("embedding request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AriaError::Embedding(http_failure(resp).await));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| AriaError::Embedding(format!("embedding parse error: {e}")))?;

        let embedding = parse_vector(&data["data"][0]["embedding"]).unwrap_or_default();
        check_dimensions(embedding, self.dims)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn embedding_space(&self) -> String {
        embedding_space("openai", &self.embedding_model, self.dims)
    }
}

#[async_trait]
impl Generator for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<mpsc::Receiver<StreamChunk>> {
        let (tx, rx) = mpsc::channel(256);

        let body = json!({
            "model": &self.generation_model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        let request = self.post("chat/completions").json(&body);

        info!(model = %self.generation_model, "OpenAI streaming request");

        tokio::spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    sse::relay("openai", resp, tx, parse_stream_event, is_final_event).await;
                }
                Ok(resp) => {
                    let _ = tx.send(StreamChunk::Error(http_failure(resp).await)).await;
                }
                Err(e) => {
                    let _ = tx
                        .send(StreamChunk::Error(format!("HTTP request failed: {e}")))
                        .await;
                }
            }
        });

        Ok(rx)
    }

    async fn extract_text(&self, file: &FileUpload) -> Result<String> {
        info!(file = %file.name, mime = %file.mime_type, bytes = file.bytes.len(), "extracting file via OpenAI");

        let body = json!({
            "model": &self.generation_model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": EXTRACTION_INSTRUCTION },
                    file_part(file),
                ],
            }],
        });

        let resp = self
            .post("chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| AriaError::Extraction(format!("extraction request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AriaError::Extraction(http_failure(resp).await));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| AriaError::Extraction(format!("extraction parse error: {e}")))?;

        extracted_text(&data)
    }
}

/// Content part carrying the uploaded file inline as a data URL.
fn file_part(file: &FileUpload) -> Value {
    let data_url = format!("data:{};base64,{}", file.mime_type, BASE64.encode(&file.bytes));
    if file.mime_type.starts_with("image/") {
        json!({ "type": "image_url", "image_url": { "url": data_url } })
    } else {
        json!({ "type": "file", "file": { "filename": file.name, "file_data": data_url } })
    }
}

/// The assistant message of a completion, refusals and empty replies rejected.
fn extracted_text(data: &Value) -> Result<String> {
    let message = &data["choices"][0]["message"];
    if let Some(refusal) = message["refusal"].as_str() {
        return Err(AriaError::Extraction(format!("extraction refused: {refusal}")));
    }
    message["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AriaError::Extraction("no text in extraction response".into()))
}

/// The chunk carrying `finish_reason` ends the response; usage and `[DONE]` may follow.
pub(crate) fn is_final_event(event: &Value) -> bool {
    event["choices"][0]["finish_reason"].is_string()
}

/// Map one chat-completions stream event to chunks.
pub(crate) fn parse_stream_event(event: &Value) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();

    if let Some(message) = event["error"]["message"].as_str() {
        chunks.push(StreamChunk::Error(message.to_string()));
        return chunks;
    }

    if let Some(text) = event["choices"][0]["delta"]["content"].as_str()
        && !text.is_empty()
    {
        chunks.push(StreamChunk::Text(text.to_string()));
    }

    // Usage (in final chunk with stream_options)
    let usage = &event["usage"];
    if usage.is_object() {
        chunks.push(StreamChunk::Usage(Usage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
        }));
    }

    chunks
}
