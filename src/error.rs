//! Domain-specific error types for ride-along

use thiserror::Error;

/// Main error type for the ride-along client
#[derive(Error, Debug)]
pub enum RideAlongError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Authentication required")]
    Unauthorized,

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("API error {status}: {}", .message.as_deref().unwrap_or("<no message>"))]
    Api {
        status: u16,
        message: Option<String>,
    },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Geocoding error: {message}")]
    Geocoding { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RideAlongError {
    /// Text shown to the user for a failed user-initiated action.
    ///
    /// Backend-provided messages are passed through verbatim; otherwise the
    /// per-operation `fallback` is used.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            RideAlongError::Api {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            RideAlongError::NotFound { resource } => format!("{resource} not found"),
            RideAlongError::Unauthorized => "Please log in to continue".to_string(),
            RideAlongError::Validation { message } => message.clone(),
            _ => fallback.to_string(),
        }
    }

    /// True when the backend rejected the session (HTTP 401).
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, RideAlongError::Unauthorized)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RideAlongError::NotFound { .. })
    }
}

impl From<anyhow::Error> for RideAlongError {
    fn from(err: anyhow::Error) -> Self {
        RideAlongError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for RideAlongError {
    fn from(err: serde_json::Error) -> Self {
        RideAlongError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for RideAlongError {
    fn from(err: reqwest::Error) -> Self {
        RideAlongError::Transport {
            message: format!("HTTP request failed: {}", err),
        }
    }
}

/// Result type alias for ride-along operations
pub type Result<T> = std::result::Result<T, RideAlongError>;
