use thiserror::Error;

#[derive(Error, Debug)]
pub enum InterceptError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Passive resource observer is not supported by this feed")]
    ObserverUnsupported,

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, InterceptError>;
