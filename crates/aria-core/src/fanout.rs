//! Per-user fan-out of streamed fragments to live subscribers.
//!
//! Delivery is best-effort and at-most-once: there is no buffering or replay,
//! so a subscriber only sees fragments published while it is attached. A user
//! channel exists only while at least one subscriber is attached; publishing to
//! a user without subscribers drops the fragment.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::types::UserId;

/// Default per-subscriber buffer for [`StreamFanout::subscribe_channel`].
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Callback invoked once per published fragment.
pub type FragmentHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Identifies one attached subscriber; pass it back to [`StreamFanout::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub user_id: UserId,
    id: u64,
}

struct Subscriber {
    id: u64,
    handler: FragmentHandler,
}

#[derive(Default)]
struct FanoutInner {
    channels: RwLock<HashMap<UserId, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

/// Broadcast bus keyed by user. Cheap to clone; clones share subscribers.
#[derive(Clone, Default)]
pub struct StreamFanout {
    inner: Arc<FanoutInner>,
}

impl StreamFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `fragment` to every subscriber currently attached to `user_id`,
    /// in subscription order. Returns how many subscribers were reached.
    pub fn publish(&self, user_id: UserId, fragment: &str) -> usize {
        // Snapshot the handlers so none of them run under the lock.
        let handlers: Vec<FragmentHandler> = {
            let channels = self.inner.channels.read();
            match channels.get(&user_id) {
                Some(subs) => subs.iter().map(|s| Arc::clone(&s.handler)).collect(),
                None => {
                    trace!(%user_id, "no subscribers, dropping fragment");
                    return 0;
                }
            }
        };

        for handler in &handlers {
            handler(fragment);
        }
        handlers.len()
    }

    /// Attach `handler` to the user's channel, creating the channel if needed.
    pub fn subscribe(&self, user_id: UserId, handler: FragmentHandler) -> SubscriptionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut channels = self.inner.channels.write();
        let subs = channels.entry(user_id).or_default();
        subs.push(Subscriber { id, handler });
        debug!(%user_id, subscription = id, subscribers = subs.len(), "subscriber attached");
        SubscriptionHandle { user_id, id }
    }

    /// Attach a buffered receiver, for transports that forward fragments from
    /// their own task (e.g. a server-push connection).
    ///
    /// `publish` never waits on the receiver: when it falls more than
    /// `capacity` fragments behind, the oldest ones are dropped and the next
    /// `recv` reports [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe_channel(
        &self,
        user_id: UserId,
        capacity: usize,
    ) -> (SubscriptionHandle, broadcast::Receiver<String>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        let handle = self.subscribe(
            user_id,
            Arc::new(move |fragment: &str| {
                // Ignore send errors (receiver already gone).
                let _ = tx.send(fragment.to_string());
            }),
        );
        (handle, rx)
    }

    /// Detach a subscriber. Returns false if it was not attached.
    /// The user's channel is removed with its last subscriber.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut channels = self.inner.channels.write();
        let Some(subs) = channels.get_mut(&handle.user_id) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != handle.id);
        let removed = subs.len() < before;
        if subs.is_empty() {
            channels.remove(&handle.user_id);
        }
        if removed {
            debug!(user_id = %handle.user_id, subscription = handle.id, "subscriber detached");
        }
        removed
    }

    pub fn subscriber_count(&self, user_id: UserId) -> usize {
        self.inner
            .channels
            .read()
            .get(&user_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Number of users with at least one attached subscriber.
    pub fn active_channels(&self) -> usize {
        self.inner.channels.read().len()
    }
}
