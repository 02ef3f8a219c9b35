use reqwest::StatusCode;

pub type Result<T> = std::result::Result<T, MatchError>;

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("Match data not found, run a refresh first")]
    NotFound,
    #[error("No match data available from any source")]
    Unavailable,
    #[error("Format error: {0}")]
    Format(String),
    #[error("Calendar session initialisation failed: {0}")]
    Initialization(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MatchError {
    pub fn format(msg: impl Into<String>) -> Self {
        MatchError::Format(msg.into())
    }

    /// Network and timeout failures. Everything else (bad markup, missing
    /// token, client-side HTTP errors) fails the same way on every attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            MatchError::Http(e) => {
                if let Some(status) = e.status() {
                    return status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
                }
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            _ => false,
        }
    }
}
