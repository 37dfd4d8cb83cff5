use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast};
use tracing::debug;

use aria_core::{
    AriaError, FileUpload, MemoryEntry, MemoryView, Personality, Result, StreamFanout,
    SubscriptionHandle, User, UserId,
};
use aria_memory::UserStore;

use crate::assistant::{Assistant, GenerateOptions};

/// The boundary a transport calls: resolves the stored user, applies their
/// personality and relays every fragment to the user's fan-out channel.
pub struct ChatService {
    users: UserStore,
    assistant: Arc<Assistant>,
    fanout: StreamFanout,
    subscriber_buffer: usize,
    /// Present when turns of the same user must run one at a time.
    turn_gates: Option<DashMap<UserId, Arc<Mutex<()>>>>,
}

impl ChatService {
    pub fn new(users: UserStore, assistant: Arc<Assistant>, fanout: StreamFanout) -> Self {
        Self {
            users,
            assistant,
            fanout,
            subscriber_buffer: aria_core::fanout::DEFAULT_SUBSCRIBER_BUFFER,
            turn_gates: None,
        }
    }

    /// Run turns of the same user strictly one after another.
    pub fn with_serialized_turns(mut self, enabled: bool) -> Self {
        self.turn_gates = enabled.then(DashMap::new);
        self
    }

    pub fn with_subscriber_buffer(mut self, capacity: usize) -> Self {
        self.subscriber_buffer = capacity.max(1);
        self
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn fanout(&self) -> &StreamFanout {
        &self.fanout
    }

    /// Create the user, or update the personality of an existing username.
    pub fn submit_profile(&self, username: &str, personality: &str) -> Result<User> {
        self.users.upsert_profile(username, personality)
    }

    pub fn change_personality(&self, user_id: UserId, personality: &str) -> Result<User> {
        self.users.set_personality(user_id, personality)
    }

    /// Answer a prompt for a stored user.
    pub async fn prompt(&self, user_id: UserId, message: &str) -> Result<MemoryEntry> {
        if message.trim().is_empty() {
            return Err(AriaError::validation("prompt", "Prompt missing"));
        }
        let user = self.users.require(user_id)?;
        let _turn = self.begin_turn(user.id).await;
        self.assistant
            .generate(user.id, message, self.options_for(&user))
            .await
    }

    /// Ingest an uploaded file for a stored user.
    pub async fn upload(&self, user_id: UserId, file: FileUpload) -> Result<MemoryEntry> {
        if file.bytes.is_empty() {
            return Err(AriaError::validation("file", "File missing"));
        }
        let user = self.users.require(user_id)?;
        let _turn = self.begin_turn(user.id).await;
        self.assistant
            .ingest_file(user.id, &file, self.options_for(&user))
            .await
    }

    /// Visible history of a stored user, oldest first.
    pub async fn history(&self, user_id: UserId) -> Result<Vec<MemoryView>> {
        let user = self.users.require(user_id)?;
        let entries = self.assistant.memory().history(user.id).await?;
        Ok(entries.iter().map(MemoryEntry::public_view).collect())
    }

    /// Attach a live-feed consumer to the user's channel.
    pub fn subscribe(&self, user_id: UserId) -> (SubscriptionHandle, broadcast::Receiver<String>) {
        self.fanout.subscribe_channel(user_id, self.subscriber_buffer)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.fanout.unsubscribe(handle)
    }

    fn options_for(&self, user: &User) -> GenerateOptions {
        let personality: Personality = user.resolved_personality();
        let fanout = self.fanout.clone();
        let user_id = user.id;
        GenerateOptions::default()
            .with_personality(personality)
            .with_fragment_sink(Arc::new(move |fragment: &str| {
                fanout.publish(user_id, fragment);
            }))
    }

    async fn begin_turn(&self, user_id: UserId) -> Option<TurnPermit<'_>> {
        let gates = self.turn_gates.as_ref()?;
        let gate = gates
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        debug!(%user_id, "waiting for turn");
        let guard = Arc::clone(&gate).lock_owned().await;
        Some(TurnPermit {
            gates,
            user_id,
            gate,
            guard: Some(guard),
        })
    }

    /// Users with a turn running or queued. Always 0 unless turns are serialized.
    pub fn active_turn_gates(&self) -> usize {
        self.turn_gates.as_ref().map_or(0, DashMap::len)
    }
}

/// Holds a user's turn gate; the gate is dropped from the map with its last holder.
struct TurnPermit<'a> {
    gates: &'a DashMap<UserId, Arc<Mutex<()>>>,
    user_id: UserId,
    gate: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TurnPermit<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Map entry plus our own handle: nobody else is waiting.
        self.gates.remove_if(&self.user_id, |_, gate| {
            Arc::ptr_eq(gate, &self.gate) && Arc::strong_count(gate) == 2
        });
    }
}
