//! Outbound message queue.
//!
//! Many producers (any thread of the host application) push; exactly one
//! session task pops. The consumer never busy-polls: it waits on
//! [`OutboundQueue::notified`] together with its heartbeat deadline.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::warn;
use wear_core::Message;

use crate::config::OverflowPolicy;

/// FIFO of messages waiting to be sent.
#[derive(Debug)]
pub struct OutboundQueue {
    items: Mutex<VecDeque<Message>>,
    notify: Notify,
    capacity: Option<usize>,
    policy: OverflowPolicy,
    dropped: AtomicU64,
}

impl OutboundQueue {
    /// Unbounded queue.
    pub fn unbounded() -> Self {
        Self::new(None, OverflowPolicy::DropOldest)
    }

    /// Queue with an optional capacity and the policy applied when full.
    pub fn new(capacity: Option<usize>, policy: OverflowPolicy) -> Self {
        OutboundQueue {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: capacity.filter(|c| *c > 0),
            policy,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a message. Never blocks.
    ///
    /// Returns the message that was discarded if the queue was full.
    pub fn push(&self, msg: Message) -> Option<Message> {
        let discarded = {
            let mut items = self.lock();
            match self.capacity {
                Some(cap) if items.len() >= cap => match self.policy {
                    OverflowPolicy::DropOldest => {
                        let oldest = items.pop_front();
                        items.push_back(msg);
                        oldest
                    }
                    OverflowPolicy::DropNewest => Some(msg),
                },
                _ => {
                    items.push_back(msg);
                    None
                }
            }
        };

        if let Some(lost) = &discarded {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(kind = %lost.kind(), policy = ?self.policy, "outbound queue full, message dropped");
        }

        // Stores a permit if the consumer is not waiting yet, so a push
        // between `pop` and `notified().await` is not missed.
        self.notify.notify_one();
        discarded
    }

    /// Take the head of the queue.
    pub fn pop(&self) -> Option<Message> {
        self.lock().pop_front()
    }

    /// Drop everything queued, returning how many messages were discarded.
    pub fn clear(&self) -> usize {
        let mut items = self.lock();
        let n = items.len();
        items.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Total messages discarded by the overflow policy.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Resolves after the next `push` (or immediately if one happened
    /// since the last wakeup).
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}
