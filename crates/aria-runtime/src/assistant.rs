use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use aria_config::AriaConfig;
use aria_core::{
    AriaError, FileUpload, FragmentHandler, MemoryEntry, NewMemory, Personality, Result, Tool,
    ToolOutcome, UserId,
};
use aria_llm::{Provider, StreamChunk, Usage};
use aria_memory::MemoryBackend;

/// Stages a turn moves through. Used for logging where a turn aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Extraction,
    Embedding,
    MemoryRecall,
    ToolAugmentation,
    PromptComposition,
    StreamingGeneration,
    Persistence,
    Done,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStage::Extraction => "extraction",
            TurnStage::Embedding => "embedding",
            TurnStage::MemoryRecall => "memory_recall",
            TurnStage::ToolAugmentation => "tool_augmentation",
            TurnStage::PromptComposition => "prompt_composition",
            TurnStage::StreamingGeneration => "streaming_generation",
            TurnStage::Persistence => "persistence",
            TurnStage::Done => "done",
        }
    }
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call overrides for [`Assistant::generate`] and [`Assistant::ingest_file`].
#[derive(Clone, Default)]
pub struct GenerateOptions {
    /// Overrides the assistant's default personality.
    pub personality: Option<Personality>,
    /// Tools to consult, in order. `None` means the assistant's default set.
    pub tools: Option<Vec<Arc<dyn Tool>>>,
    /// Whether to recall similar memories. `None` means the configured default.
    pub memory_query: Option<bool>,
    /// Called once per streamed fragment, before the next one is requested.
    pub on_fragment: Option<FragmentHandler>,
}

impl GenerateOptions {
    pub fn with_personality(mut self, personality: Personality) -> Self {
        self.personality = Some(personality);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_memory_query(mut self, enabled: bool) -> Self {
        self.memory_query = Some(enabled);
        self
    }

    pub fn with_fragment_sink(mut self, sink: FragmentHandler) -> Self {
        self.on_fragment = Some(sink);
        self
    }
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub recall_limit: usize,
    pub recall_by_default: bool,
    /// Longest wait for the next fragment. `None` waits indefinitely.
    pub fragment_timeout: Option<Duration>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            recall_limit: 5,
            recall_by_default: false,
            fragment_timeout: None,
        }
    }
}

impl AssistantConfig {
    pub fn from_config(config: &AriaConfig) -> Self {
        Self {
            recall_limit: config.memory.recall_limit,
            recall_by_default: config.memory.recall_by_default,
            fragment_timeout: (config.generation.fragment_timeout_secs > 0)
                .then(|| Duration::from_secs(config.generation.fragment_timeout_secs)),
        }
    }
}

/// Compose the prompt sent to the model, before personality decoration.
pub fn compose_prompt(memories: &[MemoryEntry], tools: &[ToolOutcome], message: &str) -> String {
    let views: Vec<_> = memories.iter().map(MemoryEntry::public_view).collect();
    let memory_json = serde_json::to_string(&views).unwrap_or_else(|_| "[]".into());

    let mut tool_map = serde_json::Map::new();
    for outcome in tools {
        tool_map.insert(
            outcome.tool().to_string(),
            serde_json::Value::String(outcome.snippet().to_string()),
        );
    }
    let tool_json = serde_json::Value::Object(tool_map).to_string();

    format!("Context Memory: {memory_json}\nTools: {tool_json}\nUser: {message}")
}

/// The assistant orchestrator.
///
/// Holds no per-call state; one instance serves concurrent turns of any
/// number of users.
pub struct Assistant {
    provider: Arc<dyn Provider>,
    memory: Arc<dyn MemoryBackend>,
    default_tools: Vec<Arc<dyn Tool>>,
    default_personality: Personality,
    config: AssistantConfig,
}

impl Assistant {
    pub fn new(provider: Arc<dyn Provider>, memory: Arc<dyn MemoryBackend>) -> Self {
        Self {
            provider,
            memory,
            default_tools: Vec::new(),
            default_personality: Personality::default(),
            config: AssistantConfig::default(),
        }
    }

    /// Tools consulted when the caller does not pass its own set.
    pub fn with_default_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.default_tools = tools;
        self
    }

    pub fn with_default_personality(mut self, personality: Personality) -> Self {
        self.default_personality = personality;
        self
    }

    pub fn with_config(mut self, config: AssistantConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn memory(&self) -> &Arc<dyn MemoryBackend> {
        &self.memory
    }

    /// Answer `message` for `user_id` and record the turn.
    ///
    /// Fragments reach `options.on_fragment` as they arrive. On failure
    /// nothing is recorded, but fragments already delivered stand.
    pub async fn generate(
        &self,
        user_id: UserId,
        message: &str,
        options: GenerateOptions,
    ) -> Result<MemoryEntry> {
        let personality = options.personality.unwrap_or(self.default_personality);
        let recall = options.memory_query.unwrap_or(self.config.recall_by_default);
        info!(%user_id, provider = self.provider.name(), %personality, recall, "generating response");

        stage(user_id, TurnStage::Embedding);
        let embedding = self
            .embed(message)
            .await
            .map_err(|e| aborted(user_id, TurnStage::Embedding, e))?;
        let space = self.provider.embedding_space();

        let memories = if recall {
            stage(user_id, TurnStage::MemoryRecall);
            self.memory
                .query(user_id, Some(&embedding), Some(&space), self.config.recall_limit)
                .await
                .map_err(|e| aborted(user_id, TurnStage::MemoryRecall, e))?
        } else {
            Vec::new()
        };

        let tools = options.tools.unwrap_or_else(|| self.default_tools.clone());
        let outcomes = if tools.is_empty() {
            Vec::new()
        } else {
            stage(user_id, TurnStage::ToolAugmentation);
            run_tools(&tools, message).await
        };

        stage(user_id, TurnStage::PromptComposition);
        let prompt = personality.apply(&compose_prompt(&memories, &outcomes, message));
        debug!(%user_id, memories = memories.len(), tools = outcomes.len(), prompt_chars = prompt.len(), "prompt composed");

        stage(user_id, TurnStage::StreamingGeneration);
        let response = self
            .stream(&prompt, options.on_fragment.as_ref())
            .await
            .map_err(|e| aborted(user_id, TurnStage::StreamingGeneration, e))?;

        stage(user_id, TurnStage::Persistence);
        let entry = self
            .memory
            .store(NewMemory::new(user_id, message, response).with_embedding(embedding, space))
            .await
            .map_err(|e| aborted(user_id, TurnStage::Persistence, e))?;

        stage(user_id, TurnStage::Done);
        info!(%user_id, memory_id = entry.id, chars = entry.response.len(), "turn recorded");
        Ok(entry)
    }

    /// Extract, remember and summarise an uploaded file.
    ///
    /// Records two entries: the extracted text (hidden, recallable) and a
    /// visible summary, which is returned.
    pub async fn ingest_file(
        &self,
        user_id: UserId,
        file: &FileUpload,
        options: GenerateOptions,
    ) -> Result<MemoryEntry> {
        let personality = options.personality.unwrap_or(self.default_personality);
        info!(%user_id, file = %file.name, mime = %file.mime_type, provider = self.provider.name(), "adding file");

        stage(user_id, TurnStage::Extraction);
        let text = self
            .provider
            .extract_text(file)
            .await
            .map_err(|e| aborted(user_id, TurnStage::Extraction, e))?;
        let space = self.provider.embedding_space();

        stage(user_id, TurnStage::Embedding);
        let embedding = self
            .embed(&text)
            .await
            .map_err(|e| aborted(user_id, TurnStage::Embedding, e))?;

        stage(user_id, TurnStage::Persistence);
        let source = self
            .memory
            .store(
                NewMemory::new(user_id, format!("FILE_UPLOAD: {}", file.name), text.as_str())
                    .with_embedding(embedding, space.as_str())
                    .hidden(),
            )
            .await
            .map_err(|e| aborted(user_id, TurnStage::Persistence, e))?;
        debug!(%user_id, memory_id = source.id, chars = text.len(), "extracted text stored");

        stage(user_id, TurnStage::StreamingGeneration);
        let prompt = personality.apply(&format!("Summarize this:\n\n{text}"));
        let summary = self
            .stream(&prompt, options.on_fragment.as_ref())
            .await
            .map_err(|e| aborted(user_id, TurnStage::StreamingGeneration, e))?;

        stage(user_id, TurnStage::Embedding);
        let summary_embedding = self
            .embed(&summary)
            .await
            .map_err(|e| aborted(user_id, TurnStage::Embedding, e))?;

        stage(user_id, TurnStage::Persistence);
        let entry = self
            .memory
            .store(
                NewMemory::new(user_id, format!("Summary of {}", file.name), summary)
                    .with_embedding(summary_embedding, space),
            )
            .await
            .map_err(|e| aborted(user_id, TurnStage::Persistence, e))?;

        stage(user_id, TurnStage::Done);
        info!(%user_id, memory_id = entry.id, file = %file.name, "file ingested");
        Ok(entry)
    }

    /// Embed `text`, refusing vectors that do not fit the provider's declared space.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.provider.embed(text).await?;
        let expected = self.provider.dimensions();
        if embedding.len() != expected {
            return Err(AriaError::EmbeddingSpaceMismatch {
                expected: self.provider.embedding_space(),
                found: format!("{} dimensions", embedding.len()),
            });
        }
        Ok(embedding)
    }

    /// Drive the provider stream to completion, feeding the sink in order.
    async fn stream(&self, prompt: &str, sink: Option<&FragmentHandler>) -> Result<String> {
        let mut rx = self.provider.generate(prompt).await?;
        let mut text = String::new();
        let mut fragments = 0usize;
        let mut usage = Usage::default();

        loop {
            let next = match self.config.fragment_timeout {
                Some(limit) => tokio::time::timeout(limit, rx.recv()).await.map_err(|_| {
                    AriaError::Generation(format!("no fragment received within {limit:?}"))
                })?,
                None => rx.recv().await,
            };

            match next {
                Some(StreamChunk::Text(fragment)) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    if let Some(sink) = sink {
                        sink(&fragment);
                    }
                    text.push_str(&fragment);
                    fragments += 1;
                }
                Some(StreamChunk::Usage(u)) => usage.merge(&u),
                Some(StreamChunk::Done) => break,
                Some(StreamChunk::Error(e)) => return Err(AriaError::Generation(e)),
                None => {
                    return Err(AriaError::Generation(
                        "stream ended without completing".into(),
                    ));
                }
            }
        }

        debug!(
            fragments,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "generation complete"
        );
        Ok(text)
    }
}

/// Run every tool concurrently. Failures become empty snippets.
async fn run_tools(tools: &[Arc<dyn Tool>], query: &str) -> Vec<ToolOutcome> {
    join_all(tools.iter().map(|tool| async move {
        let name = tool.name().to_string();
        match tool.run(query).await {
            Ok(snippet) => {
                debug!(tool = %name, chars = snippet.len(), "tool succeeded");
                ToolOutcome::Success { tool: name, snippet }
            }
            Err(e) => {
                warn!(tool = %name, error = %e, "tool failed, continuing without it");
                ToolOutcome::Failure {
                    tool: name,
                    reason: e.to_string(),
                }
            }
        }
    }))
    .await
}

fn stage(user_id: UserId, stage: TurnStage) {
    debug!(%user_id, %stage, "turn stage");
}

fn aborted(user_id: UserId, stage: TurnStage, error: AriaError) -> AriaError {
    warn!(%user_id, %stage, error = %error, "turn aborted");
    error
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(content: &str, response: &str) -> MemoryEntry {
        MemoryEntry {
            id: 1,
            user_id: uuid::Uuid::nil(),
            content: content.into(),
            response: response.into(),
            embedding: Some(vec![1.0, 2.0]),
            embedding_space: Some("mock:m:2".into()),
            hidden: false,
            created_at: Default::default(),
        }
    }

    #[test]
    fn test_compose_prompt_empty_context() {
        assert_eq!(
            compose_prompt(&[], &[], "hello"),
            "Context Memory: []\nTools: {}\nUser: hello"
        );
    }

    #[test]
    fn test_compose_prompt_hides_embeddings_and_failed_tools() {
        let memories = vec![entry("q", "a")];
        let tools = vec![
            ToolOutcome::Success {
                tool: "bing_search".into(),
                snippet: "{\"answer\":\"42\"}".into(),
            },
            ToolOutcome::Failure {
                tool: "weather".into(),
                reason: "down".into(),
            },
        ];
        let prompt = compose_prompt(&memories, &tools, "what?");
        assert!(prompt.contains("\"content\":\"q\""));
        assert!(!prompt.contains("embedding"));
        assert!(prompt.contains("\"bing_search\":\"{\\\"answer\\\":\\\"42\\\"}\""));
        assert!(prompt.contains("\"weather\":\"\""));
        assert!(!prompt.contains("down"));
        assert!(prompt.ends_with("\nUser: what?"));
    }

    #[test]
    fn test_config_from_file_settings() {
        let mut config = AriaConfig::default();
        let c = AssistantConfig::from_config(&config);
        assert_eq!(c.recall_limit, 5);
        assert!(!c.recall_by_default);
        assert!(c.fragment_timeout.is_none());

        config.generation.fragment_timeout_secs = 30;
        config.memory.recall_by_default = true;
        let c = AssistantConfig::from_config(&config);
        assert_eq!(c.fragment_timeout, Some(Duration::from_secs(30)));
        assert!(c.recall_by_default);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(TurnStage::StreamingGeneration.to_string(), "streaming_generation");
        assert_eq!(TurnStage::MemoryRecall.as_str(), "memory_recall");
    }
}
