use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration, maps to `aria.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AriaConfig {
    pub provider: ProviderConfig,
    pub memory: MemoryConfig,
    pub generation: GenerationConfig,
    pub stream: StreamConfig,
    pub services: ServicesConfig,
    pub logging: LoggingConfig,
}

// ── Provider ───────────────────────────────────────────────────

/// Which language-model backend serves embeddings, generation, and extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" | "gpt-4o" => Ok(ProviderKind::OpenAi),
            other => Err(format!("unknown provider '{other}' (expected 'gemini' or 'openai')")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Model used for streaming generation and text extraction.
    /// None = the provider's default ("gemini-2.5-flash" / "gpt-4o").
    pub generation_model: Option<String>,
    /// None = the provider's default ("text-embedding-004" / "text-embedding-3-large").
    pub embedding_model: Option<String>,
    /// Embedding dimensionality. Changing it makes existing memories incomparable.
    pub embedding_dims: usize,
    /// Override the API base URL (proxies, compatible gateways).
    pub base_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Gemini,
            generation_model: None,
            embedding_model: None,
            embedding_dims: 768,
            base_url: None,
        }
    }
}

// ── Memory ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Path to the SQLite database.
    pub db_path: PathBuf,
    /// How many nearest memories a turn recalls.
    pub recall_limit: usize,
    /// Whether turns recall memories when the caller does not say.
    pub recall_by_default: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("memory.db"),
            recall_limit: 5,
            recall_by_default: false,
        }
    }
}

// ── Generation ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Tools consulted on every turn, in order.
    pub tools: Vec<String>,
    /// Fail a turn when no fragment arrives for this many seconds. 0 = wait forever.
    pub fragment_timeout_secs: u64,
    /// Run turns of the same user one at a time.
    pub serialize_user_turns: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            tools: vec!["bing_search".into()],
            fragment_timeout_secs: 0,
            serialize_user_turns: false,
        }
    }
}

// ── Stream ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Fragments buffered per live subscriber before the oldest are dropped.
    pub subscriber_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
        }
    }
}

// ── Services ───────────────────────────────────────────────────

/// API keys for upstream services. Environment variables fill in missing keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    /// SerpApi key for the `bing_search` tool.
    pub serpapi_api_key: Option<String>,
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A validation finding with severity.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "{}: {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({h})")?;
        }
        Ok(())
    }
}

impl AriaConfig {
    /// The API key of the selected provider, if any.
    pub fn provider_api_key(&self) -> Option<&str> {
        let key = match self.provider.kind {
            ProviderKind::Gemini => self.services.gemini_api_key.as_deref(),
            ProviderKind::OpenAi => self.services.openai_api_key.as_deref(),
        };
        key.filter(|k| !k.is_empty())
    }

    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Provider ───
        if self.provider.embedding_dims == 0 {
            warnings.push(ConfigWarning {
                field: "provider.embedding_dims".into(),
                message: "embedding dimensionality is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Use 768 for text-embedding-004".into()),
            });
        }
        if self.provider_api_key().is_none() {
            let env = match self.provider.kind {
                ProviderKind::Gemini => "GEMINI_API_KEY",
                ProviderKind::OpenAi => "OPENAI_API_KEY",
            };
            warnings.push(ConfigWarning {
                field: format!("services.{}_api_key", self.provider.kind),
                message: format!("no API key for provider '{}'", self.provider.kind),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Set it in aria.toml or export {env}")),
            });
        }

        // ── Memory ───
        if self.memory.recall_limit == 0 {
            warnings.push(ConfigWarning {
                field: "memory.recall_limit".into(),
                message: "recall limit is 0, turns will never see past memories".into(),
                severity: WarningSeverity::Warning,
                hint: Some("The usual value is 5".into()),
            });
        }

        // ── Tools ───
        let known_tools = ["bing_search"];
        for tool in &self.generation.tools {
            if !known_tools.contains(&tool.as_str()) {
                warnings.push(ConfigWarning {
                    field: "generation.tools".into(),
                    message: format!("unknown tool '{tool}'"),
                    severity: WarningSeverity::Error,
                    hint: Some(format!("Available: {}", known_tools.join(", "))),
                });
            }
        }
        if self.generation.tools.iter().any(|t| t == "bing_search")
            && self.services.serpapi_api_key.is_none()
        {
            warnings.push(ConfigWarning {
                field: "services.serpapi_api_key".into(),
                message: "bing_search is enabled without a SerpApi key, it will be skipped on every turn".into(),
                severity: WarningSeverity::Info,
                hint: Some("Export SERPAPI_API_KEY or drop the tool".into()),
            });
        }

        // ── Stream ───
        if self.stream.subscriber_buffer == 0 {
            warnings.push(ConfigWarning {
                field: "stream.subscriber_buffer".into(),
                message: "buffer of 0 fragments, treated as 1".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
