use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Login rejected: {0}")]
    Rejected(String),

    #[error("Unauthorized - session is no longer valid")]
    Unauthorized(Option<String>),

    #[error("Server returned status {status}")]
    Status { status: u16, message: Option<String> },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape used by the backend: `{"error": "..."}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the `error` field out of a JSON error body, if there is one.
    pub(crate) fn error_field(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error)
            .filter(|e| !e.is_empty())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::error_field(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized(message),
            code => {
                if message.is_none() && !body.is_empty() {
                    tracing::debug!(status = code, body = %Self::truncate_body(body), "Non-JSON error body");
                }
                ApiError::Status { status: code, message }
            }
        }
    }

    /// Message provided by the backend, if any
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Rejected(m) => Some(m),
            ApiError::Unauthorized(m) | ApiError::Status { message: m, .. } => m.as_deref(),
            ApiError::Network(_) | ApiError::InvalidResponse(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// True for failures that happened before any HTTP status was seen
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::InvalidResponse(_))
    }
}
