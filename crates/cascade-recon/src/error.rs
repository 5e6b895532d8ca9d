use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReconError>;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("bulk whois connection to {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("bulk whois I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bulk whois batch timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("DNS TXT query error: {0}")]
    Dns(String),
}
