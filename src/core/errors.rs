use thiserror::Error;

#[derive(Error, Debug)]
pub enum WhitelistError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unknown repository: {0}")]
    UnknownRepository(String),

    #[error("Discovery already in progress for repository: {0}")]
    DiscoveryInProgress(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type WhitelistResult<T> = Result<T, WhitelistError>;
