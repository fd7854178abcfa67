//! Per-key async locks.
//!
//! Every read-check-then-write sequence against the store runs under the
//! lock for its key (pair, entity id), so two racing commands on the same
//! pair or event are serialized while unrelated keys proceed in parallel.
//!
//! Lock order when two are held: pair key before entity key.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: impl Into<String>) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key.into())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop locks nobody holds or waits on. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, m| Arc::strong_count(m) > 1);
        before.saturating_sub(self.locks.len())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Lock key helpers. One namespace per kind of resource.
pub mod keys {
    use huddle_proto::{PairKey, RequestKind};

    pub fn connection_pair(pair: &PairKey) -> String {
        format!("connection-pair:{pair}")
    }

    pub fn request_pair(kind: RequestKind, pair: &PairKey) -> String {
        format!("request-pair:{}:{pair}", kind.as_str())
    }

    pub fn chat_pair(pair: &PairKey) -> String {
        format!("chat-pair:{pair}")
    }

    pub fn call_pair(pair: &PairKey) -> String {
        format!("call-pair:{pair}")
    }

    pub fn event(id: &str) -> String {
        format!("event:{id}")
    }

    pub fn poll(id: &str) -> String {
        format!("poll:{id}")
    }

    pub fn chat(id: &str) -> String {
        format!("chat:{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            tasks.push(tokio::spawn(async move {
                let _guard = locks.lock("k").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let locks = KeyedLocks::new();
        let held = locks.lock("held").await;
        drop(locks.lock("idle").await);
        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }
}
