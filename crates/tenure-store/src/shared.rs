//! Shared replicated store interface.
//!
//! Models an eventually consistent key-value service: last write wins, every
//! subscriber eventually sees the latest value, and deliveries may be
//! duplicated or reordered. There is no compare-and-set unless the backend
//! advertises it through [`StoreCapabilities`].

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::StoreError;

/// Optional features a backend may offer beyond put/once/subscribe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// Atomic conditional write. Replicated stores usually lack it.
    pub compare_and_set: bool,
}

#[async_trait::async_trait]
pub trait SharedStore: Send + Sync {
    /// Overwrite the value at `key`.
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// One-shot read of the current value.
    async fn once(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Live subscription. The current value (if any) is delivered first;
    /// afterwards the subscriber eventually sees the latest value, though
    /// intermediate values may be coalesced. Dropping the handle unsubscribes.
    fn subscribe(&self, key: &str) -> Result<Subscription, StoreError>;

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::default()
    }

    /// Write `new` only if the current value equals `expected`.
    /// Returns whether the write happened.
    async fn compare_and_set(
        &self,
        _key: &str,
        _expected: &Value,
        _new: Value,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported("compare_and_set"))
    }
}

/// Handle for one live subscription.
pub struct Subscription {
    key: String,
    rx: mpsc::UnboundedReceiver<Value>,
    off: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// `off` runs exactly once, on [`Subscription::off`] or drop.
    pub fn new(
        key: impl Into<String>,
        rx: mpsc::UnboundedReceiver<Value>,
        off: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            rx,
            off: Some(Box::new(off)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next delivered value. `None` once unsubscribed or the store is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Unsubscribe.
    pub fn off(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(off) = self.off.take() {
            off();
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.off.is_some())
            .finish()
    }
}
