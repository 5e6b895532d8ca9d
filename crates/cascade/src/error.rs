//! Top-level error type for the cascade facade: aggregates the errors each
//! composed crate can raise (§7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] cascade_core::CascadeError),

    #[error(transparent)]
    Store(#[from] cascade_store::StoreError),

    #[error(transparent)]
    Cache(#[from] cascade_cache::CacheError),

    #[error(transparent)]
    Recon(#[from] cascade_recon::ReconError),

    #[error(transparent)]
    Secret(#[from] cascade_secrets::SecretError),

    #[error("failed to connect to the inventory database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
