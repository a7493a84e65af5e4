// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::utc_now;
use dashmap::DashMap;
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;

pub static LOCK_MANAGER: LazyLock<LockManager> = LazyLock::new(LockManager::new);

const SEND_LOCK_TTL_MS: i64 = 60_000;

/// Cache-backed advisory locks shared by all workers of this process.
///
/// A lock is a best-effort mutex with a TTL bounding the damage of a holder
/// that dies without releasing. Correctness-critical transitions (the
/// `is_draft -> sent_at` flip) are still guarded by the database state and
/// re-checked after acquisition.
pub struct LockManager {
    entries: DashMap<String, LockEntry>,
    thread_mutexes: DashMap<u64, Arc<Mutex<()>>>,
}

struct LockEntry {
    token: u64,
    expires_at: i64,
}

pub struct LockGuard {
    key: String,
    token: u64,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        LOCK_MANAGER
            .entries
            .remove_if(&self.key, |_, entry| entry.token == self.token);
    }
}

impl LockManager {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
            thread_mutexes: DashMap::new(),
        }
    }

    /// Try to take the advisory lock `key` for `ttl_ms`. Returns `None` when
    /// another holder owns an unexpired lock.
    pub fn try_acquire(&self, key: &str, ttl_ms: i64) -> Option<LockGuard> {
        let token = crate::id!(64);
        let now = utc_now!();
        let mut acquired = false;
        let entry = self
            .entries
            .entry(key.to_string())
            .and_modify(|entry| {
                if entry.expires_at <= now {
                    entry.token = token;
                    entry.expires_at = now + ttl_ms;
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                LockEntry {
                    token,
                    expires_at: now + ttl_ms,
                }
            });
        drop(entry);
        acquired.then(|| LockGuard {
            key: key.to_string(),
            token,
        })
    }

    /// Lock guarding the at-most-once dispatch of one outbound message.
    pub fn try_send_message_lock(&self, message_id: u64) -> Option<LockGuard> {
        self.try_acquire(&format!("send_message_lock:{}", message_id), SEND_LOCK_TTL_MS)
    }

    /// Per-thread critical section serializing `update_stats`.
    pub fn thread_mutex(&self, thread_id: u64) -> Arc<Mutex<()>> {
        self.thread_mutexes
            .entry(thread_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_until_released() {
        let manager = LockManager::new();
        let guard = manager.try_acquire("send_message_lock:42", 60_000);
        assert!(guard.is_some());
        assert!(manager.try_acquire("send_message_lock:42", 60_000).is_none());
    }

    #[test]
    fn test_expired_lock_can_be_retaken() {
        let manager = LockManager::new();
        let guard = manager.try_acquire("k", -1);
        assert!(guard.is_some());
        // TTL already elapsed, a second worker may steal the lock.
        assert!(manager.try_acquire("k", 60_000).is_some());
    }

    #[test]
    fn test_drop_releases() {
        {
            let _guard = LOCK_MANAGER.try_acquire("scoped", 60_000).unwrap();
            assert!(LOCK_MANAGER.try_acquire("scoped", 60_000).is_none());
        }
        assert!(LOCK_MANAGER.try_acquire("scoped", 60_000).is_some());
    }
}
