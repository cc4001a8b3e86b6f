use thiserror::Error;

use crate::cache::CacheError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Geocoding request failed with status {status}: {body}")]
    Request { status: u16, body: String },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("No geocoding results for {0}")]
    NoCandidates(String),

    #[error("Could not reduce {remaining} results to one for {address}")]
    Ambiguous { address: String, remaining: usize },

    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] ValidationError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GeocodeError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Request { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Invalid selection: {0}")]
    Invalid(String),

    #[error("Input closed before a selection was made")]
    Closed,

    #[error("Prompt I/O error: {0}")]
    Io(#[from] std::io::Error),
}
