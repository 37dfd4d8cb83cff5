#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    use aria_core::{
        AriaError, ErrorKind, FileUpload, FragmentHandler, MemoryEntry, NewMemory, Personality,
        Result, Tool, UserId,
    };
    use aria_llm::mock::MockScript;
    use aria_llm::{Embedder, Generator, MockProvider, OpenAiProvider, StreamChunk};
    use tokio::sync::mpsc;
    use aria_memory::{MemoryBackend, SqliteMemoryStore};
    use aria_runtime::{Assistant, AssistantConfig, GenerateOptions};

    // ── Fixtures ───────────────────────────────────────────────

    struct StaticTool {
        name: &'static str,
        snippet: &'static str,
    }

    #[async_trait]
    impl Tool for StaticTool {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self, _query: &str) -> Result<String> {
            Ok(self.snippet.to_string())
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }

        async fn run(&self, _query: &str) -> Result<String> {
            Err(AriaError::ToolUnavailable {
                tool: "broken".into(),
                reason: "service down".into(),
            })
        }
    }

    /// Store that refuses every write.
    struct ReadOnlyStore;

    #[async_trait]
    impl MemoryBackend for ReadOnlyStore {
        async fn store(&self, _memory: NewMemory) -> Result<MemoryEntry> {
            Err(AriaError::Persistence("database is read-only".into()))
        }

        async fn query(
            &self,
            _user_id: UserId,
            _embedding: Option<&[f32]>,
            _space: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<MemoryEntry>> {
            Ok(Vec::new())
        }

        async fn history(&self, _user_id: UserId) -> Result<Vec<MemoryEntry>> {
            Ok(Vec::new())
        }
    }

    /// Declares more dimensions than its embeddings actually have.
    struct MisreportingProvider(MockProvider);

    #[async_trait]
    impl Embedder for MisreportingProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.0.embed(text).await
        }

        fn dimensions(&self) -> usize {
            self.0.dimensions() * 2
        }

        fn embedding_space(&self) -> String {
            aria_llm::embedding_space("mock", "mock-embedding", self.dimensions())
        }
    }

    #[async_trait]
    impl Generator for MisreportingProvider {
        fn name(&self) -> &str {
            "misreporting"
        }

        async fn generate(&self, prompt: &str) -> Result<mpsc::Receiver<StreamChunk>> {
            self.0.generate(prompt).await
        }

        async fn extract_text(&self, file: &FileUpload) -> Result<String> {
            self.0.extract_text(file).await
        }
    }

    /// Mock embeddings with a real HTTP generator behind them.
    struct HttpGenerationProvider {
        embedder: MockProvider,
        generator: OpenAiProvider,
    }

    #[async_trait]
    impl Embedder for HttpGenerationProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.embedder.embed(text).await
        }

        fn dimensions(&self) -> usize {
            self.embedder.dimensions()
        }

        fn embedding_space(&self) -> String {
            self.embedder.embedding_space()
        }
    }

    #[async_trait]
    impl Generator for HttpGenerationProvider {
        fn name(&self) -> &str {
            self.generator.name()
        }

        async fn generate(&self, prompt: &str) -> Result<mpsc::Receiver<StreamChunk>> {
            self.generator.generate(prompt).await
        }

        async fn extract_text(&self, file: &FileUpload) -> Result<String> {
            self.generator.extract_text(file).await
        }
    }

    fn recorder() -> (FragmentHandler, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: FragmentHandler = Arc::new(move |f: &str| sink_seen.lock().push(f.to_string()));
        (sink, seen)
    }

    fn setup(provider: MockProvider) -> (Assistant, Arc<SqliteMemoryStore>, MockProvider) {
        let store = Arc::new(SqliteMemoryStore::open_in_memory().unwrap());
        let assistant = Assistant::new(Arc::new(provider.clone()), store.clone());
        (assistant, store, provider)
    }

    // ── generate ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_hello_scenario() {
        let (assistant, store, _) = setup(MockProvider::new().with_fragments(&["He", "llo!"]));
        let user = Uuid::new_v4();
        let (sink, seen) = recorder();

        let entry = assistant
            .generate(
                user,
                "hello",
                GenerateOptions::default()
                    .with_memory_query(false)
                    .with_fragment_sink(sink),
            )
            .await
            .unwrap();

        assert_eq!(*seen.lock(), vec!["He".to_string(), "llo!".to_string()]);
        assert_eq!(entry.response, "Hello!");
        assert_eq!(entry.content, "hello");
        assert!(!entry.hidden);

        let history = store.history(user).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hello");
        assert_eq!(history[0].response, "Hello!");
        assert!(!history[0].hidden);
    }

    #[tokio::test]
    async fn test_prompt_is_personality_wrapped() {
        let (assistant, _, provider) = setup(MockProvider::new().with_fragments(&["ok"]));
        assistant
            .generate(
                Uuid::new_v4(),
                "hi",
                GenerateOptions::default().with_personality(Personality::Tolkien),
            )
            .await
            .unwrap();

        let expected = Personality::Tolkien.apply("Context Memory: []\nTools: {}\nUser: hi");
        assert_eq!(provider.prompts(), vec![expected]);
    }

    #[tokio::test]
    async fn test_default_personality_is_neutral() {
        let (assistant, _, provider) = setup(MockProvider::new().with_fragments(&["ok"]));
        assistant
            .generate(Uuid::new_v4(), "hi", GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(
            provider.prompts()[0],
            Personality::Neutral.apply("Context Memory: []\nTools: {}\nUser: hi")
        );
    }

    #[tokio::test]
    async fn test_tool_failure_does_not_abort() {
        let (assistant, _, provider) = setup(MockProvider::new().with_fragments(&["still here"]));
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(BrokenTool),
            Arc::new(StaticTool {
                name: "facts",
                snippet: "sky is blue",
            }),
        ];

        let entry = assistant
            .generate(Uuid::new_v4(), "why?", GenerateOptions::default().with_tools(tools))
            .await
            .unwrap();

        assert_eq!(entry.response, "still here");
        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("\"broken\":\"\""));
        assert!(prompt.contains("\"facts\":\"sky is blue\""));
        assert!(!prompt.contains("service down"));
    }

    #[tokio::test]
    async fn test_default_tools_used_when_not_overridden() {
        let provider = MockProvider::new().with_fragments(&["a"]).with_fragments(&["b"]);
        let store = Arc::new(SqliteMemoryStore::open_in_memory().unwrap());
        let defaults: Vec<Arc<dyn Tool>> = vec![Arc::new(StaticTool {
            name: "facts",
            snippet: "x",
        })];
        let assistant =
            Assistant::new(Arc::new(provider.clone()), store).with_default_tools(defaults);

        assistant
            .generate(Uuid::new_v4(), "q", GenerateOptions::default())
            .await
            .unwrap();
        assistant
            .generate(Uuid::new_v4(), "q", GenerateOptions::default().with_tools(vec![]))
            .await
            .unwrap();

        let prompts = provider.prompts();
        assert!(prompts[0].contains("\"facts\":\"x\""));
        assert!(prompts[1].contains("Tools: {}"));
    }

    #[tokio::test]
    async fn test_memory_recall_feeds_prompt() {
        let provider = MockProvider::new()
            .with_fragments(&["first answer"])
            .with_fragments(&["second answer"]);
        let (assistant, _, provider) = setup(provider);
        let user = Uuid::new_v4();

        assistant
            .generate(user, "favourite colour is green", GenerateOptions::default())
            .await
            .unwrap();
        assistant
            .generate(
                user,
                "what is my favourite colour?",
                GenerateOptions::default().with_memory_query(true),
            )
            .await
            .unwrap();

        let prompts = provider.prompts();
        assert!(prompts[0].contains("Context Memory: []"));
        assert!(prompts[1].contains("favourite colour is green"));
        assert!(prompts[1].contains("first answer"));
    }

    #[tokio::test]
    async fn test_recall_default_follows_config() {
        let provider = MockProvider::new()
            .with_fragments(&["remembered"])
            .with_fragments(&["ok"]);
        let store = Arc::new(SqliteMemoryStore::open_in_memory().unwrap());
        let assistant = Assistant::new(Arc::new(provider.clone()), store).with_config(AssistantConfig {
            recall_by_default: true,
            ..Default::default()
        });
        let user = Uuid::new_v4();

        assistant.generate(user, "one", GenerateOptions::default()).await.unwrap();
        assistant.generate(user, "two", GenerateOptions::default()).await.unwrap();
        assert!(provider.prompts()[1].contains("remembered"));
    }

    #[tokio::test]
    async fn test_recall_ignores_other_users() {
        let provider = MockProvider::new()
            .with_fragments(&["secret answer"])
            .with_fragments(&["ok"]);
        let (assistant, _, provider) = setup(provider);

        assistant
            .generate(Uuid::new_v4(), "alice's secret", GenerateOptions::default())
            .await
            .unwrap();
        assistant
            .generate(
                Uuid::new_v4(),
                "alice's secret",
                GenerateOptions::default().with_memory_query(true),
            )
            .await
            .unwrap();
        assert!(provider.prompts()[1].contains("Context Memory: []"));
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_turn() {
        let provider = MockProvider::new()
            .with_fragments(&["never"])
            .with_embed_error("quota exceeded");
        let (assistant, store, provider) = setup(provider);
        let user = Uuid::new_v4();

        let err = assistant
            .generate(user, "hi", GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Embedding);
        assert!(provider.prompts().is_empty());
        assert_eq!(store.count(user).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_embedding_outside_declared_space_aborts_turn() {
        let provider = MockProvider::new().with_fragments(&["never"]);
        let store = Arc::new(SqliteMemoryStore::open_in_memory().unwrap());
        let assistant = Assistant::new(
            Arc::new(MisreportingProvider(provider.clone())),
            store.clone(),
        );
        let user = Uuid::new_v4();

        let err = assistant
            .generate(user, "hi", GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmbeddingSpaceMismatch);
        assert!(err.to_string().contains("mock:mock-embedding:16"));
        assert!(provider.prompts().is_empty());
        assert_eq!(store.count(user).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_generation_error_persists_nothing() {
        let provider = MockProvider::new().with_stream_error(&["par", "tial"], "connection reset");
        let (assistant, store, _) = setup(provider);
        let user = Uuid::new_v4();
        let (sink, seen) = recorder();

        let err = assistant
            .generate(user, "hi", GenerateOptions::default().with_fragment_sink(sink))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Generation);
        // Fragments already delivered are not retracted.
        assert_eq!(*seen.lock(), vec!["par".to_string(), "tial".to_string()]);
        assert_eq!(store.count(user).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upstream_stream_cut_short_is_not_recorded() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"He\"},\"finish_reason\":null}]}\n\n";
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let provider = HttpGenerationProvider {
            embedder: MockProvider::new(),
            generator: OpenAiProvider::new("k".into()).with_base_url(server.uri()),
        };
        let store = Arc::new(SqliteMemoryStore::open_in_memory().unwrap());
        let assistant = Assistant::new(Arc::new(provider), store.clone());
        let user = Uuid::new_v4();
        let (sink, seen) = recorder();

        let err = assistant
            .generate(user, "hello", GenerateOptions::default().with_fragment_sink(sink))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Generation);
        assert_eq!(*seen.lock(), vec!["He".to_string()]);
        assert!(store.history(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_error_surfaces() {
        let provider = MockProvider::new().with_fragments(&["ok"]);
        let assistant = Assistant::new(Arc::new(provider), Arc::new(ReadOnlyStore));
        let err = assistant
            .generate(Uuid::new_v4(), "hi", GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[tokio::test]
    async fn test_fragment_timeout() {
        let provider = MockProvider::new().with_script(MockScript {
            delay: Some(Duration::from_millis(500)),
            ..MockScript::fragments(&["slow"])
        });
        let store = Arc::new(SqliteMemoryStore::open_in_memory().unwrap());
        let assistant = Assistant::new(Arc::new(provider), store.clone()).with_config(AssistantConfig {
            fragment_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let user = Uuid::new_v4();

        let err = assistant
            .generate(user, "hi", GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generation);
        assert_eq!(store.count(user).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_entry_tagged_with_embedding_space() {
        let (assistant, _, provider) = setup(MockProvider::new().with_fragments(&["ok"]));
        let entry = assistant
            .generate(Uuid::new_v4(), "hi", GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(entry.embedding_space.as_deref(), Some("mock:mock-embedding:8"));
        assert_eq!(entry.embedding, Some(provider.embedding_for("hi")));
    }

    // ── ingest_file ────────────────────────────────────────────

    #[tokio::test]
    async fn test_ingest_creates_two_entries() {
        let provider = MockProvider::new()
            .with_extraction("T")
            .with_fragments(&["A short ", "summary."]);
        let (assistant, store, provider) = setup(provider);
        let user = Uuid::new_v4();
        let (sink, seen) = recorder();
        let file = FileUpload::new("notes.pdf", "application/pdf", b"%PDF-1.7".to_vec());

        let summary = assistant
            .ingest_file(user, &file, GenerateOptions::default().with_fragment_sink(sink))
            .await
            .unwrap();

        assert_eq!(summary.content, "Summary of notes.pdf");
        assert_eq!(summary.response, "A short summary.");
        assert!(!summary.hidden);
        assert_eq!(seen.lock().concat(), "A short summary.");
        assert_eq!(store.count(user).unwrap(), 2);

        let history = store.history(user).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, summary.id);

        // The hidden source is recallable.
        let recalled = store
            .query(user, Some(&provider.embedding_for("T")), None, 5)
            .await
            .unwrap();
        let source = recalled.iter().find(|e| e.hidden).unwrap();
        assert_eq!(source.content, "FILE_UPLOAD: notes.pdf");
        assert_eq!(source.response, "T");
        assert_eq!(source.user_id, user);

        assert_eq!(
            provider.prompts()[0],
            Personality::Neutral.apply("Summarize this:\n\nT")
        );
        assert_eq!(provider.embedded_texts(), vec!["T".to_string(), "A short summary.".to_string()]);
    }

    #[tokio::test]
    async fn test_ingest_extraction_failure_stores_nothing() {
        let provider = MockProvider::new().with_extraction_error("unsupported format");
        let (assistant, store, _) = setup(provider);
        let user = Uuid::new_v4();
        let file = FileUpload::new("x.bin", "application/octet-stream", vec![0, 1, 2]);

        let err = assistant
            .ingest_file(user, &file, GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Extraction);
        assert_eq!(store.count(user).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ingest_summary_failure_is_fatal() {
        let provider = MockProvider::new()
            .with_extraction("T")
            .with_stream_error(&[], "overloaded");
        let (assistant, store, _) = setup(provider);
        let user = Uuid::new_v4();
        let file = FileUpload::new("a.txt", "text/plain", b"T".to_vec());

        let err = assistant
            .ingest_file(user, &file, GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generation);
        assert!(store.history(user).await.unwrap().is_empty());
    }

    // ── concurrency ────────────────────────────────────────────

    #[tokio::test]
    async fn test_concurrent_users_do_not_interfere() {
        let mut provider = MockProvider::new();
        for _ in 0..6 {
            provider = provider.with_fragments(&["x", "y"]);
        }
        let (assistant, store, _) = setup(provider);
        let assistant = Arc::new(assistant);

        let users: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();
        let mut handles = Vec::new();
        for user in users.clone() {
            let a = Arc::clone(&assistant);
            handles.push(tokio::spawn(async move {
                a.generate(user, "hi", GenerateOptions::default()).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().response, "xy");
        }
        for user in users {
            assert_eq!(store.count(user).unwrap(), 1);
        }
    }
}
