use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("upsert retried once and still hit a uniqueness race for {entity} {key}")]
    RaceExhausted { entity: &'static str, key: String },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
