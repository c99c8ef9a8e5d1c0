use thiserror::Error;

/// Failure of a single backend fetch.
///
/// `Clone` because coalesced waiters on the same in-flight request all receive
/// the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The transport failed before any response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("{message}")]
    Http { status: u16, message: String },

    /// The body could not be decoded into the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl FetchError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;
