//! Stale-cursor expiry.
//!
//! One `DelayQueue` slot per remote user, indexed by user id. Re-arming an
//! existing user resets its slot in place, so fast pointer movement never
//! piles up timers; expiry or cancellation frees the slot.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::poll_fn;
use tokio_util::time::delay_queue::{DelayQueue, Key};

use crate::config::MAX_CURSOR_TTL_MS;

pub struct CursorReaper {
    ttl: Duration,
    queue: DelayQueue<String>,
    keys: HashMap<String, Key>,
}

impl CursorReaper {
    /// `ttl` is capped at [`MAX_CURSOR_TTL_MS`]; `DelayQueue` panics on
    /// deadlines past its wheel.
    pub fn new(ttl: Duration) -> Self {
        let max = Duration::from_millis(MAX_CURSOR_TTL_MS);
        if ttl > max {
            log::warn!("Cursor TTL {ttl:?} capped at {max:?}");
        }
        Self {
            ttl: ttl.min(max),
            queue: DelayQueue::new(),
            keys: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start or restart the liveness timer for `user_id`.
    pub fn arm(&mut self, user_id: &str) {
        match self.keys.get(user_id) {
            Some(key) => self.queue.reset(key, self.ttl),
            None => {
                let key = self.queue.insert(user_id.to_string(), self.ttl);
                self.keys.insert(user_id.to_string(), key);
            }
        }
    }

    /// Cancel the timer for `user_id`. Returns `false` if none was pending.
    pub fn cancel(&mut self, user_id: &str) -> bool {
        match self.keys.remove(user_id) {
            Some(key) => {
                self.queue.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.keys.clear();
    }

    pub fn is_armed(&self, user_id: &str) -> bool {
        self.keys.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Wait for the next user whose window elapsed.
    ///
    /// Resolves to `None` immediately when nothing is armed.
    pub async fn next_expired(&mut self) -> Option<String> {
        let expired = poll_fn(|cx| self.queue.poll_expired(cx)).await?;
        let user_id = expired.into_inner();
        self.keys.remove(&user_id);
        Some(user_id)
    }
}
