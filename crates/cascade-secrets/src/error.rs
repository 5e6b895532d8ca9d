use thiserror::Error;

pub type Result<T> = std::result::Result<T, SecretError>;

/// A secrets-resolver failure, tagged with the backend that produced it so
/// callers can map it onto `CascadeError::SecretResolution` (§7).
#[derive(Error, Debug)]
pub enum SecretError {
    #[error("environment variable {0} is not set")]
    EnvNotSet(String),

    #[error("failed to read secret file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("1Password CLI (`op`) lookup failed: {0}")]
    OnePassword(String),

    #[error("AWS Secrets Manager lookup failed: {0}")]
    AwsSecretsManager(String),

    #[error("Vault KV lookup failed: {0}")]
    Vault(String),

    #[error("SOPS decryption failed: {0}")]
    Sops(String),

    #[error("unrecognized secret reference: {0}")]
    UnrecognizedReference(String),

    #[error("field {field} not found in JSON payload from {backend}")]
    MissingJsonField { backend: &'static str, field: String },

    #[error("backend {backend} is not enabled in this build (feature gated)")]
    BackendDisabled { backend: &'static str },
}
