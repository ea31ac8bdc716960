use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Session expired - request was not sent")]
    SessionExpired,

    #[error("Session rejected by server - token may be expired or revoked")]
    SessionRejected,

    #[error("Unauthorized - invalid credentials")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Validation(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

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

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            400 => ApiError::BadRequest(truncated),
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Whether this error ended the session.
    pub fn is_session_error(&self) -> bool {
        matches!(self, ApiError::SessionExpired | ApiError::SessionRejected)
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::SessionExpired | ApiError::SessionRejected => {
                "Session expired. Please log in again.".to_string()
            }
            ApiError::Unauthorized => "Invalid username or password".to_string(),
            ApiError::AccessDenied(_) => "You do not have permission to do that.".to_string(),
            ApiError::NotFound(_) => "Not found.".to_string(),
            ApiError::RateLimited => {
                "Server is busy. Please wait a moment and try again.".to_string()
            }
            ApiError::NetworkError(e) if e.is_timeout() => {
                "Connection timed out. Please try again.".to_string()
            }
            ApiError::NetworkError(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            ApiError::Validation(msg) => msg.clone(),
            other => format!("Error: {}", other),
        }
    }
}
