use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("geo/ASN database at {path} failed validation: {reason}")]
    DbValidation { path: String, reason: String },

    #[error("geo/ASN database I/O error at {path}: {source}")]
    DbIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("geo/ASN database lookup error: {0}")]
    DbLookup(#[from] maxminddb::MaxMindDbError),

    #[error("geo/ASN auto-update failed: {0}")]
    AutoUpdate(String),

    #[error("scanner-intel HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("scanner-intel response could not be parsed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("scanner-intel secret resolution failed: {0}")]
    Secret(#[from] cascade_secrets::SecretError),
}
