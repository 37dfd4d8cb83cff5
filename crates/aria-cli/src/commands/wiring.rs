use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

use aria_config::{AriaConfig, ProviderKind};
use aria_core::{AriaError, FragmentHandler, Result, StreamFanout, User};
use aria_llm::{GeminiProvider, OpenAiProvider, Provider};
use aria_memory::SqliteMemoryStore;
use aria_runtime::{Assistant, AssistantConfig, ChatService, build_tools};

/// Construct the provider selected by `[provider]`.
pub(super) fn build_provider(config: &AriaConfig) -> Result<Arc<dyn Provider>> {
    let Some(api_key) = config.provider_api_key().map(str::to_string) else {
        let env = match config.provider.kind {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        };
        return Err(AriaError::Config(format!(
            "no API key for provider '{}': set services.{}_api_key in aria.toml or export {env}",
            config.provider.kind,
            config.provider.kind.as_str(),
        )));
    };
    let p = &config.provider;

    let provider: Arc<dyn Provider> = match p.kind {
        ProviderKind::Gemini => {
            let mut provider = GeminiProvider::new(api_key);
            if let Some(url) = &p.base_url {
                provider = provider.with_base_url(url.clone());
            }
            if let Some(model) = &p.generation_model {
                provider = provider.with_generation_model(model.clone());
            }
            let embedding_model = p
                .embedding_model
                .clone()
                .unwrap_or_else(|| aria_llm::gemini::DEFAULT_EMBEDDING_MODEL.into());
            Arc::new(provider.with_embedding_model(embedding_model, p.embedding_dims))
        }
        ProviderKind::OpenAi => {
            let mut provider = OpenAiProvider::new(api_key);
            if let Some(url) = &p.base_url {
                provider = provider.with_base_url(url.clone());
            }
            if let Some(model) = &p.generation_model {
                provider = provider.with_generation_model(model.clone());
            }
            let embedding_model = p
                .embedding_model
                .clone()
                .unwrap_or_else(|| aria_llm::openai::DEFAULT_EMBEDDING_MODEL.into());
            Arc::new(provider.with_embedding_model(embedding_model, p.embedding_dims))
        }
    };

    info!(provider = provider.name(), space = %provider.embedding_space(), "provider ready");
    Ok(provider)
}

/// Open the memory database, creating its directory when needed.
pub(super) fn open_store(config: &AriaConfig) -> Result<Arc<SqliteMemoryStore>> {
    let path = &config.memory.db_path;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(SqliteMemoryStore::open(path)?))
}

/// Wire provider, memory, tools and fan-out into a chat service.
pub(super) fn build_service(config: &AriaConfig) -> Result<ChatService> {
    let store = open_store(config)?;
    let provider = build_provider(config)?;
    let tools = build_tools(&config.generation.tools, config)?;
    if config.generation.tools.iter().any(|t| t == "bing_search")
        && config.services.serpapi_api_key.is_none()
    {
        warn!("bing_search enabled without a SerpApi key; searches will be skipped");
    }

    let assistant = Assistant::new(provider, store.clone())
        .with_default_tools(tools)
        .with_config(AssistantConfig::from_config(config));

    Ok(ChatService::new(store.users(), Arc::new(assistant), StreamFanout::new())
        .with_serialized_turns(config.generation.serialize_user_turns)
        .with_subscriber_buffer(config.stream.subscriber_buffer))
}

/// Look a user up by id or, failing that, by username.
pub(super) fn resolve_user(service: &ChatService, user: &str) -> Result<User> {
    if let Ok(id) = uuid::Uuid::parse_str(user)
        && let Some(found) = service.users().get(id)?
    {
        return Ok(found);
    }
    service
        .users()
        .find_by_username(user)?
        .ok_or_else(|| AriaError::NotFound(format!("user '{user}' (create it with `aria profile`)")))
}

/// Fan-out handler that writes each fragment straight to stdout.
pub(super) fn print_fragments() -> FragmentHandler {
    Arc::new(|fragment: &str| {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(fragment.as_bytes());
        let _ = out.flush();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_provider_requires_key() {
        let config = AriaConfig::default();
        let err = build_provider(&config).err().expect("expected Err");
        assert_eq!(err.kind(), aria_core::ErrorKind::Config);
    }

    #[test]
    fn test_build_provider_per_kind() {
        let mut config = AriaConfig::default();
        config.services.gemini_api_key = Some("g".into());
        config.services.openai_api_key = Some("o".into());

        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "gemini");
        assert_eq!(provider.embedding_space(), "gemini:text-embedding-004:768");

        config.provider.kind = ProviderKind::OpenAi;
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.embedding_space(), "openai:text-embedding-3-large:768");
    }

    #[test]
    fn test_open_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AriaConfig::default();
        config.memory.db_path = dir.path().join("nested").join("memory.db");
        open_store(&config).unwrap();
        assert!(config.memory.db_path.exists());
    }

    #[test]
    fn test_resolve_user_by_name_or_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AriaConfig::default();
        config.memory.db_path = dir.path().join("memory.db");
        config.services.gemini_api_key = Some("g".into());
        config.generation.tools.clear();
        let service = build_service(&config).unwrap();

        let user = service.submit_profile("bilbo", "Tolkien").unwrap();
        assert_eq!(resolve_user(&service, "bilbo").unwrap().id, user.id);
        assert_eq!(resolve_user(&service, &user.id.to_string()).unwrap().id, user.id);
        let err = resolve_user(&service, "gollum").unwrap_err();
        assert_eq!(err.kind(), aria_core::ErrorKind::NotFound);
    }
}
