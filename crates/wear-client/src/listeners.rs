// crates/wear-client/src/listeners.rs

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::error;
use wear_core::{Message, MessageKind};

/// Callback invoked with every received message of the registered kind.
pub type StatusCallback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Handle returned by registration, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Per-kind listener lists, invoked in registration order.
pub struct ListenerRegistry {
    next_id: AtomicU64,
    by_kind: DashMap<MessageKind, Vec<(ListenerId, StatusCallback)>>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            by_kind: DashMap::new(),
        }
    }

    pub fn add(&self, kind: MessageKind, callback: StatusCallback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.by_kind.entry(kind).or_default().push((id, callback));
        id
    }

    /// Returns `false` if `id` was not registered (or already removed).
    pub fn remove(&self, id: ListenerId) -> bool {
        for mut entry in self.by_kind.iter_mut() {
            let listeners = entry.value_mut();
            if let Some(pos) = listeners.iter().position(|(lid, _)| *lid == id) {
                listeners.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn count(&self, kind: MessageKind) -> usize {
        self.by_kind.get(&kind).map_or(0, |list| list.len())
    }

    /// Invoke every listener registered for `msg.kind()`.
    ///
    /// The map is not locked while callbacks run, so a callback may add or
    /// remove listeners. A panicking callback is logged and skipped.
    /// Returns how many callbacks ran.
    pub fn dispatch(&self, msg: &Message) -> usize {
        let callbacks: Vec<StatusCallback> = match self.by_kind.get(&msg.kind()) {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return 0,
        };

        for callback in &callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(msg))).is_err() {
                error!(kind = %msg.kind(), "status listener panicked");
            }
        }
        callbacks.len()
    }
}
