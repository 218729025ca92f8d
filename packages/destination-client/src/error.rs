use thiserror::Error;

pub type Result<T> = std::result::Result<T, DestinationError>;

#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("destination service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid destination input: {0}")]
    InvalidInput(String),
}
