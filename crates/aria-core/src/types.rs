use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::personality::Personality;

/// Stable public identifier of a user; also keys the user's fan-out channel.
pub type UserId = Uuid;

/// Sequential identifier of a memory entry.
pub type MemoryId = i64;

/// A user of the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Stored personality tag, e.g. "Tolkien". Resolved at call time.
    pub personality: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The personality this user selected, falling back to the default for unknown tags.
    pub fn resolved_personality(&self) -> Personality {
        Personality::resolve(Some(&self.personality))
    }
}

/// One persisted interaction: a user turn or an ingestion step.
///
/// Entries are immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: MemoryId,
    pub user_id: UserId,
    /// The user's input, or a synthetic label for ingested documents.
    pub content: String,
    /// The assistant's full output, the extracted document text, or a summary.
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Which provider/model/dimensionality produced `embedding`,
    /// e.g. `"gemini:text-embedding-004:768"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_space: Option<String>,
    /// Raw ingested source text, recallable but kept out of visible history.
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    /// The user-facing projection, without ids or vectors.
    pub fn public_view(&self) -> MemoryView {
        MemoryView {
            content: self.content.clone(),
            response: self.response.clone(),
            created_at: self.created_at,
        }
    }
}

/// What a listing or a prompt gets to see of a memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryView {
    pub content: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// A memory entry that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub user_id: UserId,
    pub content: String,
    pub response: String,
    pub embedding: Option<Vec<f32>>,
    pub embedding_space: Option<String>,
    pub hidden: bool,
}

impl NewMemory {
    pub fn new(user_id: UserId, content: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            user_id,
            content: content.into(),
            response: response.into(),
            embedding: None,
            embedding_space: None,
            hidden: false,
        }
    }

    /// Attach an embedding and the space it lives in.
    pub fn with_embedding(mut self, embedding: Vec<f32>, space: impl Into<String>) -> Self {
        self.embedding = Some(embedding);
        self.embedding_space = Some(space.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// Raw bytes of an uploaded file, handed in by the transport layer.
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Original file name, used to label the stored entries.
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}
