use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no parent dir for {}", .0.display())]
    NoParent(PathBuf),
    /// The backing store lacks this capability (e.g. compare-and-set).
    #[error("store does not support {0}")]
    Unsupported(&'static str),
    #[error("subscriptions require a running tokio runtime")]
    NoRuntime,
}
