//! Error types for content store operations

use thiserror::Error;

/// Errors from the external content store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Content store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Document {id} was modified concurrently")]
    Conflict { id: String },

    #[error("Data format error: {message}")]
    Format { message: String },

    #[error("Document {id} not found")]
    NotFound { id: String },

    #[error("Content store is not configured: {message}")]
    NotConfigured { message: String },
}

impl StoreError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Whether trying the same call again can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network { .. } => true,
            StoreError::Http { status, .. } => *status == 429 || *status >= 500,
            StoreError::Conflict { .. }
            | StoreError::Format { .. }
            | StoreError::NotFound { .. }
            | StoreError::NotConfigured { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_are_retryable() {
        assert!(StoreError::network("connection reset").is_retryable());
        assert!(StoreError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(StoreError::Http { status: 429, body: String::new() }.is_retryable());
    }

    #[test]
    fn client_side_failures_are_not_retryable() {
        assert!(!StoreError::Http { status: 400, body: String::new() }.is_retryable());
        assert!(!StoreError::Conflict { id: "a".into() }.is_retryable());
        assert!(!StoreError::NotFound { id: "a".into() }.is_retryable());
    }
}
