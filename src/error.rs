//! Error types for the tracker
//!
//! Errors are classified by recoverability:
//! - Retryable: network failures, non-200 responses, unparseable bodies
//! - Auth: bad identity data, counting before authentication
//! - RequiresUserAction: missing host/API key

use thiserror::Error;

/// Error type shared by the Redmine client, config store and notifier
#[derive(Debug, Error)]
pub enum TrackerError {
    // Retryable errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Redmine responded with HTTP {0}")]
    HttpStatus(u16),

    #[error("Failed to parse Redmine response: {0}")]
    Parse(String),

    // Authentication errors
    #[error("Incorrect user data")]
    IncorrectUserData,

    #[error("Not authenticated: account identity has not been fetched yet")]
    NotAuthenticated,

    // Requires user action
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Notification failed: {0}")]
    Notification(String),
}

impl TrackerError {
    /// Returns true if the next timer tick may succeed without intervention
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackerError::Network(_)
                | TrackerError::HttpStatus(_)
                | TrackerError::Parse(_)
                | TrackerError::IncorrectUserData
                | TrackerError::NotAuthenticated
        )
    }

    /// Returns true if this error requires user action to resolve
    pub fn requires_user_action(&self) -> bool {
        matches!(self, TrackerError::Configuration(_))
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            TrackerError::Network(_) => "Check your connection to the Redmine host.",
            TrackerError::HttpStatus(401) | TrackerError::HttpStatus(403) => {
                "Check the API key with `rmtracker configure --apikey`."
            }
            TrackerError::HttpStatus(_) => "Redmine rejected the request. It will be retried.",
            TrackerError::Parse(_) => "Verify the configured host points at a Redmine instance.",
            TrackerError::IncorrectUserData => {
                "Check the API key with `rmtracker configure --apikey`."
            }
            TrackerError::NotAuthenticated => "Authentication will be retried automatically.",
            TrackerError::Configuration(_) => {
                "Set the host and API key with `rmtracker configure`."
            }
            TrackerError::Io(_) => "Check permissions on ~/.rmtracker.",
            TrackerError::Notification(_) => "Check that a desktop notifier is installed.",
        }
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        TrackerError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TrackerError::Parse(err.to_string())
        } else {
            TrackerError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Parse(err.to_string())
    }
}
