use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An external lookup that contributes a text snippet to a turn's prompt.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name, used as the key of the snippet in the prompt, e.g. "bing_search".
    fn name(&self) -> &str;

    /// Look up `query`. Fails with [`crate::AriaError::ToolUnavailable`].
    async fn run(&self, query: &str) -> crate::Result<String>;
}

/// The result of one tool invocation within a single turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { tool: String, snippet: String },
    Failure { tool: String, reason: String },
}

impl ToolOutcome {
    pub fn tool(&self) -> &str {
        match self {
            ToolOutcome::Success { tool, .. } | ToolOutcome::Failure { tool, .. } => tool,
        }
    }

    /// The text that goes into the prompt. Failed tools contribute an empty snippet.
    pub fn snippet(&self) -> &str {
        match self {
            ToolOutcome::Success { snippet, .. } => snippet,
            ToolOutcome::Failure { .. } => "",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ToolOutcome::Failure { .. })
    }
}
