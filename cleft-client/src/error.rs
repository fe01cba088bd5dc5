use thiserror::Error;

/// Errors raised by the client core
#[derive(Error, Debug)]
pub enum ClientError {
    /// The backend rejected the presented credential (HTTP 401)
    #[error("Authorization failed: {0}")]
    Unauthorized(String),

    #[error("Backend returned {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Token storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// The backend's `detail` message, when the error carries one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ClientError::Api { detail, .. } | ClientError::Unauthorized(detail)
                if !detail.is_empty() =>
            {
                Some(detail.as_str())
            }
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized(_))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
