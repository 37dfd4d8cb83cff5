use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::{AriaConfig, ProviderKind};

/// Loads the Aria configuration.
pub struct ConfigLoader {
    config: AriaConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > ARIA_CONFIG env > ~/.aria/aria.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("ARIA_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".aria")
            .join("aria.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> aria_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw).map_err(|e| {
                aria_core::AriaError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            AriaConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        // Validate config: log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(aria_core::AriaError::Config(e));
            }
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Parse a TOML document without touching the environment.
    pub fn parse(raw: &str) -> Result<AriaConfig, toml::de::Error> {
        toml::from_str::<AriaConfig>(raw)
    }

    /// Get a snapshot of the current config.
    pub fn get(&self) -> AriaConfig {
        self.config.clone()
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (ARIA_PROVIDER, ARIA_LOG_LEVEL, ARIA_DB_PATH) and
    /// fill in API keys the file leaves unset.
    fn apply_env_overrides(mut config: AriaConfig) -> AriaConfig {
        if let Ok(v) = std::env::var("ARIA_PROVIDER") {
            match v.parse::<ProviderKind>() {
                Ok(kind) => config.provider.kind = kind,
                Err(e) => warn!(error = %e, "ignoring ARIA_PROVIDER"),
            }
        }
        if let Ok(v) = std::env::var("ARIA_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("ARIA_DB_PATH") {
            config.memory.db_path = PathBuf::from(v);
        }
        // API keys: config file takes priority, env is the fallback.
        if config.services.gemini_api_key.is_none() {
            if let Ok(v) = std::env::var("GEMINI_API_KEY") {
                config.services.gemini_api_key = Some(v);
            }
        }
        if config.services.openai_api_key.is_none() {
            if let Ok(v) = std::env::var("OPENAI_API_KEY") {
                config.services.openai_api_key = Some(v);
            }
        }
        if config.services.serpapi_api_key.is_none() {
            if let Ok(v) = std::env::var("SERPAPI_API_KEY") {
                config.services.serpapi_api_key = Some(v);
            }
        }
        config
    }
}
