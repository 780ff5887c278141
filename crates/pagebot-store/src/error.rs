use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache directory not usable: {0}")]
    CacheDir(std::path::PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt cache entry {path}: {source}")]
    Corrupt {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },

    #[error("serialisation error: {0}")]
    Json(#[from] serde_json::Error),
}
