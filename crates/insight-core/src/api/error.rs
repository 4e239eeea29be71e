use serde_json::Value;
use thiserror::Error;

/// Message carried by every 401 outcome
pub const UNAUTHORIZED_MESSAGE: &str =
    "Authentication failed - the server rejected the bearer token";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{}", UNAUTHORIZED_MESSAGE)]
    Unauthorized,

    #[error("{message}")]
    Status {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Session changed while the request was in flight")]
    SessionChanged,
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

    /// Build the error for a non-2xx response.
    ///
    /// The message comes from the JSON body's `message` field, then its
    /// `error` field, then the raw text, then a generic "API Error: <status>".
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 401 {
            return ApiError::Unauthorized;
        }

        let json = serde_json::from_str::<Value>(body).ok();
        let json_message = json.as_ref().and_then(|value| {
            ["message", "error"]
                .iter()
                .find_map(|field| value.get(field).and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

        let message = match json_message {
            Some(message) => message,
            None if json.is_none() && !body.trim().is_empty() => Self::truncate_body(body.trim()),
            None => format!("API Error: {}", status),
        };

        ApiError::Status {
            status,
            message,
            body: json,
        }
    }

    /// HTTP status, when the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for 401s. Callers are expected to log the session out.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Parsed JSON error body, if the server sent one
    pub fn raw_body(&self) -> Option<&Value> {
        match self {
            ApiError::Status { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Network(e.to_string())
    }
}
