use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use aria_core::{AriaError, Personality, Result, User, UserId};

use crate::store::{parse_timestamp, parse_uuid, persistence};

const MAX_USERNAME_CHARS: usize = 256;

/// User profiles: created on first submission, personality mutable at any time.
#[derive(Clone)]
pub struct UserStore {
    db: Arc<Mutex<Connection>>,
}

impl UserStore {
    pub(crate) fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Create the user on first submission, or update the personality of the
    /// existing user with this username. A single statement, so concurrent
    /// submissions of one username all resolve to the same user.
    pub fn upsert_profile(&self, username: &str, personality: &str) -> Result<User> {
        validate_username(username)?;
        let personality: Personality = personality.parse()?;

        let candidate = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let user = {
            let db = self.db.lock();
            db.query_row(
                "INSERT INTO users (id, username, personality, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(username) DO UPDATE SET
                     personality = excluded.personality,
                     updated_at = excluded.updated_at
                 RETURNING id, username, personality, created_at, updated_at",
                rusqlite::params![candidate.to_string(), username, personality.tag(), now],
                row_to_user,
            )
            .map_err(persistence)?
        };

        if user.id == candidate {
            info!(user_id = %user.id, username, personality = %user.personality, "user created");
        } else {
            info!(user_id = %user.id, username, personality = %user.personality, "personality changed");
        }
        Ok(user)
    }

    pub fn get(&self, id: UserId) -> Result<Option<User>> {
        let db = self.db.lock();
        db.query_row(
            "SELECT id, username, personality, created_at, updated_at FROM users WHERE id = ?1",
            rusqlite::params![id.to_string()],
            row_to_user,
        )
        .optional()
        .map_err(persistence)
    }

    /// Like [`UserStore::get`], failing with `NotFound` for unknown ids.
    pub fn require(&self, id: UserId) -> Result<User> {
        self.get(id)?
            .ok_or_else(|| AriaError::NotFound(format!("user {id}")))
    }

    pub fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let db = self.db.lock();
        db.query_row(
            "SELECT id, username, personality, created_at, updated_at FROM users WHERE username = ?1",
            rusqlite::params![username],
            row_to_user,
        )
        .optional()
        .map_err(persistence)
    }

    /// Change the stored personality. The tag must be one of the known personalities.
    pub fn set_personality(&self, id: UserId, personality: &str) -> Result<User> {
        let personality: Personality = personality.parse()?;
        let now = Utc::now();
        let updated = {
            let db = self.db.lock();
            db.execute(
                "UPDATE users SET personality = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![personality.tag(), now.to_rfc3339(), id.to_string()],
            )
            .map_err(persistence)?
        };
        if updated == 0 {
            return Err(AriaError::NotFound(format!("user {id}")));
        }
        info!(user_id = %id, personality = %personality, "personality changed");
        self.require(id)
    }
}

fn validate_username(username: &str) -> Result<()> {
    let chars = username.chars().count();
    if chars == 0 {
        return Err(AriaError::validation("username", "username missing"));
    }
    if chars > MAX_USERNAME_CHARS {
        return Err(AriaError::validation(
            "username",
            format!("username longer than {MAX_USERNAME_CHARS} characters"),
        ));
    }
    Ok(())
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        username: row.get(1)?,
        personality: row.get(2)?,
        created_at: parse_timestamp(3, &row.get::<_, String>(3)?)?,
        updated_at: parse_timestamp(4, &row.get::<_, String>(4)?)?,
    })
}
