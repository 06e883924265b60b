//! Error types for the directory collector.

use thiserror::Error;

/// Result type alias using `AadError`.
pub type AadResult<T> = Result<T, AadError>;

/// Errors that can occur while enumerating a directory.
#[derive(Debug, Error)]
pub enum AadError {
    /// Configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token acquisition failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The directory API returned an error payload, a non-success status,
    /// or a body that could not be interpreted.
    #[error("Directory API error: {code} - {message}")]
    DirectoryApi { code: String, message: String },

    /// A record that needs expansion has neither id field.
    #[error("{type_name} record has no object id")]
    MissingObjectId { type_name: String },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Output sink failure.
    #[error("Sink error: {0}")]
    Sink(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A crawler task panicked or was aborted.
    #[error("Crawler task failed: {0}")]
    Task(String),
}

impl AadError {
    pub(crate) fn directory(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DirectoryApi {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors reported by the directory itself rather than
    /// by the transport or the local process.
    #[must_use]
    pub fn is_directory_error(&self) -> bool {
        matches!(self, Self::DirectoryApi { .. })
    }

    /// Returns true for token acquisition failures.
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_error_display() {
        let err = AadError::directory("Authorization_RequestDenied", "Insufficient privileges");
        assert_eq!(
            err.to_string(),
            "Directory API error: Authorization_RequestDenied - Insufficient privileges"
        );
        assert!(err.is_directory_error());
        assert!(!err.is_auth_error());
    }

    #[test]
    fn test_missing_object_id_display() {
        let err = AadError::MissingObjectId {
            type_name: "AADGroup".to_string(),
        };
        assert_eq!(err.to_string(), "AADGroup record has no object id");
    }
}
