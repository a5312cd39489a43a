use thiserror::Error;

/// Failure taxonomy for backend calls.
///
/// `Clone` because a single in-flight fetch result is handed to every
/// caller that joined it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("not authorised")]
    Unauthorized,
    #[error("limit reached: {}", message.as_deref().unwrap_or("quota exceeded"))]
    QuotaExceeded { message: Option<String> },
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("{0}")]
    Validation(String),
    #[error("i/o error: {0}")]
    Io(String),
}

impl ClientError {
    /// 401s end the session silently instead of surfacing an error.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
