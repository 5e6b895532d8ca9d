use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("L2 cache store error: {0}")]
    L2(#[source] sqlx::Error),

    #[error("L3 cache I/O error at {path}: {source}")]
    L3 {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize cache value for {source_name}/{key}: {error}")]
    Serialize {
        source_name: &'static str,
        key: String,
        error: serde_json::Error,
    },

    #[error("failed to deserialize cache value for {source_name}/{key}: {error}")]
    Deserialize {
        source_name: &'static str,
        key: String,
        error: serde_json::Error,
    },
}
