//! Process-scoped change notification
//!
//! A live mapping from user id to listener handles, owned by the host and
//! torn down on shutdown. Delivery is best-effort: a send never blocks, a
//! full or dropped listener is pruned, and a lost notification is harmless
//! because clients can always re-fetch the session view. Cross-process
//! fan-out needs an external broker; this registry only covers a single
//! instance.

use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Mutex;

use uuid::Uuid;

use crate::practice::store::ChangeNotifier;

/// Capacity per listener. One pending wake-up is enough; the payload is
/// always "re-fetch the view".
const CHANNEL_CAPACITY: usize = 1;

/// Handle held by a connected client
pub struct Subscription {
    pub receiver: Receiver<()>,
}

pub struct NotifierRegistry {
    listeners: Mutex<HashMap<Uuid, Vec<SyncSender<()>>>>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Register a listener for a user. The subscription ends when the
    /// returned receiver is dropped; the dead sender is pruned on the next
    /// notification.
    pub fn subscribe(&self, user_id: Uuid) -> Subscription {
        let (tx, rx) = sync_channel(CHANNEL_CAPACITY);
        let mut listeners = self.listeners.lock().unwrap();
        listeners.entry(user_id).or_default().push(tx);
        Subscription { receiver: rx }
    }

    pub fn listener_count(&self, user_id: Uuid) -> usize {
        let listeners = self.listeners.lock().unwrap();
        listeners.get(&user_id).map(|v| v.len()).unwrap_or(0)
    }

    /// Drop every listener. Call on process shutdown.
    pub fn shutdown(&self) {
        let mut listeners = self.listeners.lock().unwrap();
        let dropped: usize = listeners.values().map(|v| v.len()).sum();
        listeners.clear();
        if dropped > 0 {
            log::info!("notifier registry shut down, dropped {} listeners", dropped);
        }
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier for NotifierRegistry {
    fn notify_changed(&self, user_id: Uuid) {
        let mut listeners = self.listeners.lock().unwrap();
        let Some(senders) = listeners.get_mut(&user_id) else {
            return;
        };
        senders.retain(|tx| match tx.try_send(()) {
            Ok(()) => true,
            // A pending wake-up already queued is as good as a new one
            Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => false,
        });
        if senders.is_empty() {
            listeners.remove(&user_id);
        }
    }
}

/// Notifier for embeddings without any push transport
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn notify_changed(&self, _user_id: Uuid) {}
}
