//! Error types for SuperLink
//!
//! One error enum for every domain service, the AI layer and persistence,
//! so callers can propagate with `?` across module boundaries.

use thiserror::Error;

/// Main error type for the SuperLink engine
#[derive(Error, Debug)]
pub enum LinkError {
    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Actor is not allowed to perform the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Input failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Operation collides with existing state (duplicates, uniqueness)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Lifecycle transition not allowed from the current state
    #[error("Cannot {action} {entity} in state {from}")]
    InvalidState {
        entity: &'static str,
        from: String,
        action: &'static str,
    },

    /// One of the users has blocked the other
    #[error("Interaction blocked between users")]
    Blocked,

    /// No AI model is configured or reachable
    #[error("AI unavailable: {0}")]
    AiUnavailable(String),

    /// AI provider returned a non-success status
    #[error("AI API error (HTTP {status}): {message}")]
    AiApi { status: u16, message: String },

    /// AI provider refused the request for lack of credits (HTTP 402)
    #[error("AI provider reports insufficient credits")]
    InsufficientCredits,

    /// Streaming errors
    #[error("Streaming error: {0}")]
    Streaming(String),

    /// Model output could not be interpreted
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Generic errors with context
    #[error("SuperLink error: {0}")]
    Generic(String),
}

impl LinkError {
    /// Shorthand for a missing entity
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LinkError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        LinkError::PermissionDenied(reason.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        LinkError::Validation(reason.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        LinkError::Conflict(reason.into())
    }
}

/// Result type alias for SuperLink operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Convert anyhow errors to LinkError
impl From<anyhow::Error> for LinkError {
    fn from(err: anyhow::Error) -> Self {
        LinkError::Generic(err.to_string())
    }
}

impl From<toml::de::Error> for LinkError {
    fn from(err: toml::de::Error) -> Self {
        LinkError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LinkError {
    fn from(err: toml::ser::Error) -> Self {
        LinkError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = LinkError::not_found("user", 42);
        assert_eq!(err.to_string(), "user 42 not found");
    }

    #[test]
    fn test_invalid_state_display() {
        let err = LinkError::InvalidState {
            entity: "connection request",
            from: "rejected".to_string(),
            action: "accept",
        };
        assert!(err.to_string().contains("accept"));
        assert!(err.to_string().contains("rejected"));
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: LinkError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, LinkError::Generic(ref m) if m == "boom"));
    }
}
