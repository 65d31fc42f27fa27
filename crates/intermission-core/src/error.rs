//! Error types for Intermission Core

use thiserror::Error;

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Monitor error types
#[derive(Error, Debug)]
pub enum Error {
    // Metadata service errors
    #[error("Unauthorized: stored credentials rejected")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Metadata request failed with status {status}: {url}")]
    Http { status: u16, url: String },

    #[error("Metadata fetch failed: {0}")]
    Fetch(String),

    #[cfg(feature = "http")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // Parsing errors
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Lifecycle errors
    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Error::Fetch(msg.into())
    }

    /// Returns true for errors that should degrade to "no data" at the call site
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Unauthorized
            | Error::Forbidden(_)
            | Error::NotFound(_)
            | Error::Http { .. }
            | Error::Fetch(_) => true,
            #[cfg(feature = "http")]
            Error::Network(_) => true,
            _ => false,
        }
    }

    /// Returns the error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Unauthorized => "UNAUTHORIZED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Http { .. } => "HTTP",
            Error::Fetch(_) => "FETCH",
            #[cfg(feature = "http")]
            Error::Network(_) => "NETWORK",
            Error::Url(_) => "URL",
            Error::Json(_) => "JSON",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Unauthorized.is_transient());
        assert!(Error::NotFound("item".into()).is_transient());
        assert!(Error::Http { status: 500, url: "/Sessions".into() }.is_transient());
        assert!(!Error::InvalidConfig("idleMinutes".into()).is_transient());
        assert!(!Error::Internal("boom".into()).is_transient());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Unauthorized.error_code(), "UNAUTHORIZED");
        assert_eq!(Error::fetch("boom").error_code(), "FETCH");
    }
}
