use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::shared::{SharedStore, StoreCapabilities, Subscription};

/// In-process replicated store.
///
/// Clones share one backing map, so each clone stands in for a client's
/// replica. Every put fans out to all subscribers of the key. With
/// [`MemoryStore::with_duplicate_delivery`] each update is delivered twice,
/// the way a replicated store may redeliver on reconnect.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    duplicate: bool,
    transactional: bool,
}

#[derive(Default)]
struct Inner {
    values: HashMap<String, Value>,
    subscribers: HashMap<String, Vec<(u64, mpsc::UnboundedSender<Value>)>>,
    next_id: u64,
}

impl Inner {
    fn publish(&mut self, key: &str, value: Value, duplicate: bool) {
        if let Some(subs) = self.subscribers.get_mut(key) {
            subs.retain(|(_, tx)| {
                if duplicate && tx.send(value.clone()).is_err() {
                    return false;
                }
                tx.send(value.clone()).is_ok()
            });
        }
        self.values.insert(key.to_string(), value);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that also offers atomic compare-and-set.
    pub fn transactional() -> Self {
        Self {
            transactional: true,
            ..Self::default()
        }
    }

    pub fn with_duplicate_delivery(mut self, duplicate: bool) -> Self {
        self.duplicate = duplicate;
        self
    }

    /// Number of live subscriptions on `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.lock()
            .subscribers
            .get(key)
            .map(|subs| subs.iter().filter(|(_, tx)| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn unsubscribe(inner: &Weak<Mutex<Inner>>, key: &str, id: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut guard = lock_inner(&inner);
    if let Some(subs) = guard.subscribers.get_mut(key) {
        subs.retain(|(sid, _)| *sid != id);
        if subs.is_empty() {
            guard.subscribers.remove(key);
        }
    }
}

#[async_trait::async_trait]
impl SharedStore for MemoryStore {
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.lock().publish(key, value, self.duplicate);
        Ok(())
    }

    async fn once(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.lock().values.get(key).cloned())
    }

    fn subscribe(&self, key: &str) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.lock();
        if let Some(current) = guard.values.get(key) {
            let _ = tx.send(current.clone());
        }
        let id = guard.next_id;
        guard.next_id += 1;
        guard
            .subscribers
            .entry(key.to_string())
            .or_default()
            .push((id, tx));
        drop(guard);

        let weak = Arc::downgrade(&self.inner);
        let owned_key = key.to_string();
        Ok(Subscription::new(key, rx, move || {
            unsubscribe(&weak, &owned_key, id)
        }))
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            compare_and_set: self.transactional,
        }
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &Value,
        new: Value,
    ) -> Result<bool, StoreError> {
        if !self.transactional {
            return Err(StoreError::Unsupported("compare_and_set"));
        }
        let mut guard = self.lock();
        if guard.values.get(key) != Some(expected) {
            return Ok(false);
        }
        guard.publish(key, new, self.duplicate);
        Ok(true)
    }
}
