use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use aria_core::{AriaError, FileUpload, Result};

use crate::provider::*;
use crate::sse;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_EMBEDDING_DIMS: usize = 768;

const EXTRACTION_INSTRUCTION: &str =
    "Extract all readable text from this file. Output only the raw text.";

/// Google Gemini provider (Generative Language API).
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    generation_model: String,
    embedding_model: String,
    dims: usize,
}

impl GeminiProvider {
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

    /// Use a custom base URL (proxies, test servers).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_generation_model(mut self, model: String) -> Self {
        self.generation_model = model;
        self
    }

    pub fn with_embedding_model(mut self, model: String, dims: usize) -> Self {
        self.embedding_model = model;
        self.dims = dims;
        self
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    // The key travels in a header so it never shows up in reqwest's URL-bearing errors.
    fn post(&self, url: String) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
    }
}

#[async_trait]
impl Embedder for GeminiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(model = %self.embedding_model, chars = text.len(), "generating embedding");

        let body = json!({
            "model": format!("models/{}", self.embedding_model),
            "content": { "parts": [{ "text": text }] },
            "outputDimensionality": self.dims,
        });

        let resp = self
            .post(self.url(&self.embedding_model, "embedContent"))
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

        let embedding = parse_vector(&data["embedding"]["values"]).unwrap_or_default();
        check_dimensions(embedding, self.dims)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn embedding_space(&self) -> String {
        embedding_space("gemini", &self.embedding_model, self.dims)
    }
}

#[async_trait]
impl Generator for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<mpsc::Receiver<StreamChunk>> {
        let (tx, rx) = mpsc::channel(256);

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });
        let request = self
            .post(format!(
                "{}?alt=sse",
                self.url(&self.generation_model, "streamGenerateContent")
            ))
            .json(&body);

        info!(model = %self.generation_model, "Gemini streaming request");

        tokio::spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    sse::relay("gemini", resp, tx, parse_stream_event, is_final_event).await;
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
        info!(file = %file.name, mime = %file.mime_type, bytes = file.bytes.len(), "extracting file via Gemini multimodal");

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": EXTRACTION_INSTRUCTION },
                    { "inlineData": { "mimeType": file.mime_type, "data": BASE64.encode(&file.bytes) } },
                ],
            }],
        });

        let resp = self
            .post(self.url(&self.generation_model, "generateContent"))
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

        match candidate_text(&data) {
            Some(text) => Ok(text),
            None => Err(AriaError::Extraction(match block_reason(&data) {
                Some(reason) => format!("extraction blocked ({reason})"),
                None => "no text in extraction response".into(),
            })),
        }
    }
}

/// Text of the first candidate, when it has any text parts.
fn candidate_text(event: &Value) -> Option<String> {
    let parts = event["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts
        .iter()
        .filter(|p| !p["thought"].as_bool().unwrap_or(false))
        .filter_map(|p| p["text"].as_str())
        .collect();
    Some(text)
}

/// A finish or block reason other than a normal stop.
fn block_reason(event: &Value) -> Option<String> {
    if let Some(reason) = event["promptFeedback"]["blockReason"].as_str() {
        return Some(reason.to_string());
    }
    match event["candidates"][0]["finishReason"].as_str() {
        Some("STOP") | Some("MAX_TOKENS") | None => None,
        Some(other) => Some(other.to_string()),
    }
}

/// Gemini sends no `[DONE]`; the event with a `finishReason` is the last one.
pub(crate) fn is_final_event(event: &Value) -> bool {
    event["candidates"][0]["finishReason"].is_string()
}

/// Map one `streamGenerateContent` event to chunks.
pub(crate) fn parse_stream_event(event: &Value) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();

    if let Some(message) = event["error"]["message"].as_str() {
        chunks.push(StreamChunk::Error(message.to_string()));
        return chunks;
    }

    match candidate_text(event) {
        Some(text) if !text.is_empty() => chunks.push(StreamChunk::Text(text)),
        Some(_) => {}
        None => {
            if let Some(reason) = block_reason(event) {
                warn!(reason = %reason, "Gemini response blocked");
                chunks.push(StreamChunk::Error(format!("response blocked ({reason})")));
                return chunks;
            }
        }
    }

    let usage = &event["usageMetadata"];
    if event["candidates"][0]["finishReason"].is_string() && usage.is_object() {
        chunks.push(StreamChunk::Usage(Usage {
            input_tokens: usage["promptTokenCount"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
        }));
    }

    chunks
}
