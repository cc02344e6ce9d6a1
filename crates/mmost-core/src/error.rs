//! Error types for the core library.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A required credential or identifier is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The request never produced a response (connect, timeout, DNS).
    #[error("request failed: {0}")]
    Transport(String),

    /// A completed response with a non-success status.
    #[error("{message}")]
    Api {
        /// Message embedding the status code and any server-supplied text.
        message: String,
        /// HTTP status code of the failed response.
        status: u16,
        /// Parsed JSON error body, when the server sent one.
        body: Option<serde_json::Value>,
    },

    /// An I/O error from local file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A response body that could not be parsed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    /// Build an [`ClientError::Api`] from a status code and optional parsed body.
    ///
    /// The message mirrors the server's `message` field when present.
    #[must_use]
    pub fn api(status: u16, body: Option<serde_json::Value>) -> Self {
        let mut message = format!("API request failed: {status}");
        if let Some(text) = body
            .as_ref()
            .and_then(|b| b.get("message"))
            .and_then(serde_json::Value::as_str)
        {
            message.push_str(" - ");
            message.push_str(text);
        }
        Self::Api {
            message,
            status,
            body,
        }
    }

    /// The HTTP status code, for API errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias using [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_error_embeds_server_message() {
        let err = ClientError::api(404, Some(json!({"message": "Channel not found"})));
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "API request failed: 404 - Channel not found");
    }

    #[test]
    fn api_error_without_body_keeps_status_only() {
        let err = ClientError::api(502, None);
        assert_eq!(err.to_string(), "API request failed: 502");
        assert_eq!(err.status(), Some(502));
    }

    #[test]
    fn non_api_errors_have_no_status() {
        let err = ClientError::Config("token missing".to_string());
        assert_eq!(err.status(), None);
    }
}
