//! CLI error types and exit codes

use dirscout_aad::AadError;
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success (including a run without directory access)
/// - 1: Configuration or I/O error
/// - 2: Authentication error
/// - 3: Network error
/// - 5: Directory API error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Directory API error: {code} - {message}")]
    Directory { code: String, message: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Collector task failed: {0}")]
    Task(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Io(_) | CliError::Task(_) => 1,
            CliError::AuthenticationFailed(_) => 2,
            CliError::Network(_) => 3,
            CliError::Directory { .. } => 5,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    /// Get a suggested action for this error
    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::AuthenticationFailed(_) => {
                Some("Run 'az login' or check the service principal credentials.")
            }
            CliError::Network(_) => Some("Check your network connection and the --cloud setting."),
            CliError::Directory { code, .. } if code.starts_with("Authorization_") => {
                Some("The identity needs directory read permissions in this tenant.")
            }
            _ => None,
        }
    }
}

impl From<AadError> for CliError {
    fn from(e: AadError) -> Self {
        match e {
            AadError::Config(msg) => CliError::Config(msg),
            AadError::Url(e) => CliError::Config(format!("Invalid URL: {e}")),
            AadError::Json(e) => CliError::Config(format!("JSON error: {e}")),
            AadError::Auth(msg) => CliError::AuthenticationFailed(msg),
            AadError::Http(e) if e.is_timeout() => {
                CliError::Network("Request timed out".to_string())
            }
            AadError::Http(e) => CliError::Network(e.to_string()),
            AadError::DirectoryApi { code, message } => CliError::Directory { code, message },
            e @ AadError::MissingObjectId { .. } => CliError::Directory {
                code: "MissingObjectId".to_string(),
                message: e.to_string(),
            },
            AadError::Io(e) => CliError::Io(e.to_string()),
            AadError::Sink(msg) => CliError::Io(msg),
            AadError::Task(msg) => CliError::Task(msg),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Config(format!("JSON error: {}", e))
    }
}
