use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error: {0}")]
    Rpc(#[from] solana_client::client_error::ClientError),

    #[error("Price feed error: {0}")]
    Price(String),

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("{0} timed out")]
    Timeout(&'static str),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
