#[cfg(test)]
mod tests {
    use aria_llm::mock::MockScript;
    use aria_llm::{Embedder, Generator, MockProvider, Provider, StreamChunk};
    use std::sync::Arc;

    async fn collect_stream(provider: &dyn Provider, prompt: &str) -> String {
        let mut rx = provider.generate(prompt).await.unwrap();
        let mut text = String::new();
        while let Some(chunk) = rx.recv().await {
            match chunk {
                StreamChunk::Text(t) => text.push_str(&t),
                StreamChunk::Done => break,
                StreamChunk::Error(e) => panic!("unexpected stream error: {e}"),
                StreamChunk::Usage(_) => {}
            }
        }
        text
    }

    #[tokio::test]
    async fn test_streaming_matches_non_streaming() {
        let fragments = ["The ", "quick ", "brown", " fox", "\u{e9}"];
        let provider = MockProvider::new()
            .with_fragments(&fragments)
            .with_fragments(&fragments);

        let streamed = collect_stream(&provider, "p").await;
        let complete = provider.complete("p").await.unwrap();
        assert_eq!(streamed, complete);
        assert_eq!(complete, fragments.concat());
    }

    #[tokio::test]
    async fn test_provider_as_trait_object() {
        let provider: Arc<dyn Provider> =
            Arc::new(MockProvider::new().with_fragments(&["ok"]).with_dimensions(16));
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.dimensions(), 16);
        assert_eq!(provider.embedding_space(), "mock:mock-embedding:16");
        assert_eq!(provider.embed("x").await.unwrap().len(), 16);
        assert_eq!(collect_stream(provider.as_ref(), "p").await, "ok");
    }

    #[tokio::test]
    async fn test_concurrent_generations_do_not_interfere() {
        let mut provider = MockProvider::new();
        for i in 0..8 {
            let a = format!("a{i}");
            let b = format!("b{i}");
            provider = provider.with_script(MockScript::fragments(&[a.as_str(), b.as_str()]));
        }
        let provider = Arc::new(provider);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let p = Arc::clone(&provider);
            handles.push(tokio::spawn(async move { p.complete("q").await.unwrap() }));
        }

        let mut outputs = Vec::new();
        for handle in handles {
            outputs.push(handle.await.unwrap());
        }
        outputs.sort();
        let expected: Vec<String> = {
            let mut v: Vec<String> = (0..8).map(|i| format!("a{i}b{i}")).collect();
            v.sort();
            v
        };
        assert_eq!(outputs, expected);
        assert_eq!(provider.prompts().len(), 8);
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_stream() {
        let provider = MockProvider::new().with_fragments(&["a", "b", "c"]);
        let rx = provider.generate("p").await.unwrap();
        drop(rx);
        // Next script is still served normally.
        let provider = provider.with_fragments(&["next"]);
        assert_eq!(provider.complete("p").await.unwrap(), "next");
    }
}
