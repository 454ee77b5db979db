use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::shared::{SharedStore, StoreCapabilities, Subscription};
use crate::{lock_file, write_atomic};

/// Directory-backed shared store for processes on one host.
///
/// Layout: `{root}/{blake3(key)[..32]}.json`, plus `{root}/.lock` taken around
/// every write. Subscriptions poll the key's file and emit when its bytes
/// change, so intermediate values between two polls may be skipped (last
/// write wins anyway).
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
    poll_interval: Duration,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            root: root.into(),
            poll_interval,
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let hash = blake3::hash(key.as_bytes());
        self.root.join(format!("{}.json", &hash.to_hex()[..32]))
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(".lock")
    }
}

/// Read and parse a value file. Missing or unparseable files read as absent.
fn read_value(path: &Path) -> Result<Option<Value>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_slice(&bytes) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable store value");
            Ok(None)
        }
    }
}

/// Run a lock-holding file operation off the async workers; the lock may
/// block while another process writes.
async fn locked<T, F>(op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}

#[async_trait::async_trait]
impl SharedStore for DirStore {
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(&value)?;
        let (lock, path) = (self.lock_path(), self.path_for(key));
        locked(move || {
            let _guard = lock_file(&lock)?;
            write_atomic(&path, &data)
        })
        .await
    }

    async fn once(&self, key: &str) -> Result<Option<Value>, StoreError> {
        read_value(&self.path_for(key))
    }

    fn subscribe(&self, key: &str) -> Result<Subscription, StoreError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let path = self.path_for(key);
        let interval = self.poll_interval;

        let stop = cancel.clone();
        handle.spawn(async move {
            let mut last: Option<Vec<u8>> = None;
            loop {
                let bytes = fs::read(&path).ok();
                if bytes != last {
                    if let Some(value) = bytes
                        .as_deref()
                        .and_then(|b| serde_json::from_slice::<Value>(b).ok())
                    {
                        if tx.send(value).is_err() {
                            break;
                        }
                    }
                    last = bytes;
                }
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        Ok(Subscription::new(key, rx, move || cancel.cancel()))
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            compare_and_set: true,
        }
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &Value,
        new: Value,
    ) -> Result<bool, StoreError> {
        let data = serde_json::to_vec_pretty(&new)?;
        let (lock, path) = (self.lock_path(), self.path_for(key));
        let expected = expected.clone();
        locked(move || {
            let _guard = lock_file(&lock)?;
            if read_value(&path)?.as_ref() != Some(&expected) {
                return Ok(false);
            }
            write_atomic(&path, &data)?;
            Ok(true)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(dir: &Path) -> DirStore {
        DirStore::new(dir, Duration::from_millis(20))
    }

    #[tokio::test]
    async fn put_once_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        assert_eq!(s.once("accounts/a/session").await.unwrap(), None);
        s.put("accounts/a/session", json!({"tabId": "t"})).await.unwrap();
        assert_eq!(
            s.once("accounts/a/session").await.unwrap(),
            Some(json!({"tabId": "t"}))
        );
        // Distinct keys land in distinct files.
        assert_eq!(s.once("accounts/b/session").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        fs::write(s.path_for("k"), b"{not json").unwrap();
        assert_eq!(s.once("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn subscription_sees_current_and_later_values() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        s.put("k", json!(1)).await.unwrap();

        let mut sub = s.subscribe("k").unwrap();
        assert_eq!(sub.recv().await, Some(json!(1)));

        // A second process sharing the directory.
        let other = store(tmp.path());
        other.put("k", json!(2)).await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .unwrap();
        assert_eq!(next, Some(json!(2)));
        sub.off();
    }

    #[tokio::test]
    async fn compare_and_set_is_supported() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        assert!(s.capabilities().compare_and_set);
        s.put("k", json!("mine")).await.unwrap();
        assert!(!s.compare_and_set("k", &json!("theirs"), json!(null)).await.unwrap());
        assert!(s.compare_and_set("k", &json!("mine"), json!(null)).await.unwrap());
        assert_eq!(s.once("k").await.unwrap(), Some(Value::Null));
    }

    #[tokio::test]
    async fn put_waits_for_a_held_lock_without_stalling_the_runtime() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(tmp.path());
        let guard = lock_file(&s.lock_path()).unwrap();

        let writer = s.clone();
        let put = tokio::spawn(async move { writer.put("k", json!("late")).await });
        // The current-thread runtime keeps making progress while the put waits.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!put.is_finished());
        assert_eq!(s.once("k").await.unwrap(), None);

        drop(guard);
        put.await.unwrap().unwrap();
        assert_eq!(s.once("k").await.unwrap(), Some(json!("late")));
    }

    #[test]
    fn subscribe_outside_runtime_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = store(tmp.path()).subscribe("k").unwrap_err();
        assert!(matches!(err, StoreError::NoRuntime));
    }
}
