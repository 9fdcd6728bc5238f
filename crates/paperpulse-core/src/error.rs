//! Error types for PaperPulse.
//!
//! Internal failures carry enough context for logs; [`PulseError::user_message`]
//! turns them into the short plain-text replies shown to chat users.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the PaperPulse library.
#[derive(Debug, Error)]
pub enum PulseError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Cache store unavailable: {0}")]
    CacheUnavailable(String),

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("XML error: {message}")]
    Xml { message: String },

    // Upstream API errors
    #[error("{service} API error: {message}")]
    Api {
        service: String,
        message: String,
        status_code: Option<u16>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Caller input
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("No {service} result found")]
    NoResults { service: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for PaperPulse operations.
pub type Result<T> = std::result::Result<T, PulseError>;

impl From<std::io::Error> for PulseError {
    fn from(err: std::io::Error) -> Self {
        PulseError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PulseError {
    fn from(err: serde_json::Error) -> Self {
        PulseError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for PulseError {
    fn from(err: rusqlite::Error) -> Self {
        PulseError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for PulseError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PulseError::Timeout(std::time::Duration::from_secs(0))
        } else {
            PulseError::Network {
                message: err.to_string(),
                cause: Some(err.to_string()),
            }
        }
    }
}

impl From<quick_xml::Error> for PulseError {
    fn from(err: quick_xml::Error) -> Self {
        PulseError::Xml {
            message: err.to_string(),
        }
    }
}

impl PulseError {
    /// Create a validation error for a caller-supplied argument.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PulseError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Check if this error is a transient upstream failure.
    ///
    /// Scans and bulk fetches degrade to partial results on any failure;
    /// only transient ones are expected, the rest are logged as errors.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PulseError::Network { .. }
                | PulseError::Timeout(_)
                | PulseError::RateLimited { .. }
                | PulseError::Api { .. }
        )
    }

    /// Plain-text message suitable for showing to an end user.
    ///
    /// Internal details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            PulseError::Validation { .. } => "Invalid argument".to_string(),
            PulseError::NotFound { what } => format!("No result found: {}", what),
            PulseError::NoResults { .. } => self.to_string(),
            PulseError::RateLimited { service, .. } => {
                format!("{} is rate limiting requests, try again later", service)
            }
            _ => "Something went wrong, try again later".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let network = PulseError::Network {
            message: "connection reset".to_string(),
            cause: None,
        };
        assert!(network.is_transient());
        assert!(PulseError::Timeout(std::time::Duration::from_secs(5)).is_transient());
        assert!(!PulseError::validation("filter", "bad").is_transient());
        assert!(!PulseError::CacheUnavailable("locked".to_string()).is_transient());
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = PulseError::Database {
            message: "disk I/O error at /var/cache/pulse.sqlite".to_string(),
            source: None,
        };
        assert!(!err.user_message().contains("/var/cache"));

        let err = PulseError::NotFound {
            what: "1234.5678".to_string(),
        };
        assert_eq!(err.user_message(), "No result found: 1234.5678");
        assert_eq!(
            PulseError::validation("filter", "bad characters").user_message(),
            "Invalid argument"
        );
        let err = PulseError::NoResults {
            service: "arXiv".to_string(),
        };
        assert_eq!(err.user_message(), "No arXiv result found");
    }
}
