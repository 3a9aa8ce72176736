use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

/// Internal failure taxonomy for the protocol paths.
///
/// Nothing here ever reaches a caller of `SearchService::search`; each
/// spawned invocation logs its error and resets the loading flag instead.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SearchError::Timeout(err.to_string())
        } else if err.is_decode() {
            SearchError::Decode(err.to_string())
        } else {
            SearchError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SearchError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SearchError::Channel(err.to_string())
    }
}
