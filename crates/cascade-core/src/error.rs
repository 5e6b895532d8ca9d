use thiserror::Error;

/// Result type alias for cascade operations.
pub type Result<T> = std::result::Result<T, CascadeError>;

/// Errors surfaced to callers of the cascade. Per-source failures are
/// recovered locally by the orchestrator and recorded in `_meta`; only the
/// variants below actually propagate out of `enrich_ip`.
#[derive(Error, Debug)]
pub enum CascadeError {
    /// A uniqueness or FK race during inventory upsert that survived one retry.
    #[error("storage conflict: {0}")]
    StorageConflict(String),

    /// A non-retryable I/O or integrity error in a persistent store.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A secrets-resolver failure, surfaced at startup or first use.
    #[error("secret resolution failed ({backend}): {message}")]
    SecretResolution { backend: String, message: String },

    /// The IP address could not be parsed as IPv4.
    #[error("malformed IP address: {0}")]
    MalformedInput(String),

    /// Generic internal error; used sparingly.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Non-retryable storage-layer error, distinct from the retried
/// [`CascadeError::StorageConflict`].
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("foreign key violation: ip referenced asn {asn} which does not exist")]
    MissingAsn { asn: i64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A per-source failure, always recovered locally and recorded in `_meta`.
/// Never returned from `enrich_ip` itself.
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    /// The source could not be consulted at all (db missing, network error,
    /// budget exhausted).
    #[error("source {source} unavailable: {reason}")]
    Unavailable { source: &'static str, reason: String },

    /// A specific form of `Unavailable` carrying retry-after information.
    #[error("source {source} rate limited, retry after {retry_after_secs:?}s")]
    RateLimited {
        source: &'static str,
        retry_after_secs: Option<u64>,
    },
}

impl SourceError {
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Unavailable { reason, .. } => reason.clone(),
            Self::RateLimited { .. } => "rate_limited".to_string(),
        }
    }
}
