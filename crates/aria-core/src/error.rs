use thiserror::Error;

/// Unified error type for the Aria assistant.
#[derive(Error, Debug)]
pub enum AriaError {
    // ── Provider errors ────────────────────────────────────────
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("embedding space mismatch: expected {expected}, found {found}")]
    EmbeddingSpaceMismatch { expected: String, found: String },

    // ── Tool errors ────────────────────────────────────────────
    #[error("tool unavailable: {tool}: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    // ── Storage errors ─────────────────────────────────────────
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("not found: {0}")]
    NotFound(String),

    // ── Input errors ───────────────────────────────────────────
    #[error("validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Payload-free tag for an [`AriaError`], so callers at the boundary can map
/// failures to transport responses without matching on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Embedding,
    Generation,
    Extraction,
    EmbeddingSpaceMismatch,
    ToolUnavailable,
    Persistence,
    NotFound,
    Validation,
    Config,
    Internal,
}

impl AriaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AriaError::Embedding(_) => ErrorKind::Embedding,
            AriaError::Generation(_) => ErrorKind::Generation,
            AriaError::Extraction(_) => ErrorKind::Extraction,
            AriaError::EmbeddingSpaceMismatch { .. } => ErrorKind::EmbeddingSpaceMismatch,
            AriaError::ToolUnavailable { .. } => ErrorKind::ToolUnavailable,
            AriaError::Persistence(_) => ErrorKind::Persistence,
            AriaError::NotFound(_) => ErrorKind::NotFound,
            AriaError::Validation { .. } => ErrorKind::Validation,
            AriaError::Config(_) => ErrorKind::Config,
            AriaError::Io(_) | AriaError::Serialization(_) | AriaError::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Only tool failures may be absorbed by the enclosing turn.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AriaError::ToolUnavailable { .. })
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AriaError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AriaError>;
