use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use aria_core::{AriaError, MemoryEntry, NewMemory, Result, UserId};

use crate::users::UserStore;
use crate::vector::{decode_embedding, encode_embedding, euclidean_distance};

/// Append-only persistence of memory entries with similarity recall.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Durably append an entry. Never touches existing entries.
    async fn store(&self, memory: NewMemory) -> Result<MemoryEntry>;

    /// The `limit` entries of `user_id` nearest to `embedding`, nearest first.
    ///
    /// Hidden entries are eligible. An absent embedding yields no entries.
    /// When `space` is given, entries embedded in a different space are skipped;
    /// entries of a different dimensionality are always skipped.
    async fn query(
        &self,
        user_id: UserId,
        embedding: Option<&[f32]>,
        space: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>>;

    /// Visible (non-hidden) entries of `user_id`, oldest first.
    async fn history(&self, user_id: UserId) -> Result<Vec<MemoryEntry>>;
}

/// SQLite-backed memory store.
pub struct SqliteMemoryStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteMemoryStore {
    /// Open or create the memory database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening memory store");

        let conn = Connection::open(path).map_err(persistence)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(persistence)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                personality TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS memory (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                response TEXT NOT NULL,
                embedding BLOB,
                embedding_space TEXT,
                hidden INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_memory_user ON memory(user_id, hidden);
            ",
        )
        .map_err(persistence)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// User profiles stored in the same database.
    pub fn users(&self) -> UserStore {
        UserStore::new(Arc::clone(&self.db))
    }

    /// Number of entries stored for a user, hidden ones included.
    pub fn count(&self, user_id: UserId) -> Result<usize> {
        let db = self.db.lock();
        let n: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM memory WHERE user_id = ?1",
                rusqlite::params![user_id.to_string()],
                |row| row.get(0),
            )
            .map_err(persistence)?;
        Ok(n as usize)
    }
}

#[async_trait]
impl MemoryBackend for SqliteMemoryStore {
    async fn store(&self, memory: NewMemory) -> Result<MemoryEntry> {
        let created_at = Utc::now();
        let blob = memory.embedding.as_deref().map(encode_embedding);

        let id = {
            let db = self.db.lock();
            db.execute(
                "INSERT INTO memory (user_id, content, response, embedding, embedding_space, hidden, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    memory.user_id.to_string(),
                    memory.content,
                    memory.response,
                    blob,
                    memory.embedding_space,
                    memory.hidden as i32,
                    created_at.to_rfc3339(),
                ],
            )
            .map_err(persistence)?;
            db.last_insert_rowid()
        };

        debug!(id, user_id = %memory.user_id, hidden = memory.hidden, "memory stored");

        Ok(MemoryEntry {
            id,
            user_id: memory.user_id,
            content: memory.content,
            response: memory.response,
            embedding: memory.embedding,
            embedding_space: memory.embedding_space,
            hidden: memory.hidden,
            created_at,
        })
    }

    async fn query(
        &self,
        user_id: UserId,
        embedding: Option<&[f32]>,
        space: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>> {
        let Some(query) = embedding else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let candidates = {
            let db = self.db.lock();
            let mut stmt = db
                .prepare(
                    "SELECT id, user_id, content, response, embedding, embedding_space, hidden, created_at
                     FROM memory
                     WHERE user_id = ?1 AND embedding IS NOT NULL",
                )
                .map_err(persistence)?;
            stmt.query_map(rusqlite::params![user_id.to_string()], row_to_entry)
                .map_err(persistence)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(persistence)?
        };

        let mut skipped = 0usize;
        let mut scored: Vec<(f32, MemoryEntry)> = candidates
            .into_iter()
            .filter_map(|entry| {
                let comparable = match (space, entry.embedding_space.as_deref()) {
                    (Some(wanted), Some(found)) => wanted == found,
                    _ => true,
                };
                let distance = entry
                    .embedding
                    .as_deref()
                    .and_then(|stored| euclidean_distance(query, stored))
                    .filter(|_| comparable);
                match distance {
                    Some(d) => Some((d, entry)),
                    None => {
                        skipped += 1;
                        None
                    }
                }
            })
            .collect();

        if skipped > 0 {
            warn!(
                %user_id,
                skipped,
                space = space.unwrap_or("any"),
                dims = query.len(),
                "skipped memories from a different embedding space"
            );
        }

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, entry)| entry).collect())
    }

    async fn history(&self, user_id: UserId) -> Result<Vec<MemoryEntry>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, user_id, content, response, embedding, embedding_space, hidden, created_at
                 FROM memory
                 WHERE user_id = ?1 AND hidden = 0
                 ORDER BY id",
            )
            .map_err(persistence)?;
        let rows = stmt
            .query_map(rusqlite::params![user_id.to_string()], row_to_entry)
            .map_err(persistence)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(persistence)?;
        Ok(rows)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryEntry> {
    let blob: Option<Vec<u8>> = row.get(4)?;
    Ok(MemoryEntry {
        id: row.get(0)?,
        user_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        content: row.get(2)?,
        response: row.get(3)?,
        embedding: blob.as_deref().and_then(decode_embedding),
        embedding_space: row.get(5)?,
        hidden: row.get::<_, i32>(6)? != 0,
        created_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
    })
}

pub(crate) fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn persistence(e: rusqlite::Error) -> AriaError {
    AriaError::Persistence(e.to_string())
}
