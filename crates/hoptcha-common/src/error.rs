//! Common error types for Hoptcha components.

use thiserror::Error;

/// Common errors across Hoptcha components
#[derive(Debug, Error)]
pub enum HoptchaError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key strategy name not among the built-ins
    #[error("Unknown key strategy: {0}")]
    UnknownKeyStrategy(String),

    /// HTTP method name that does not parse
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Counter store connection/operation error
    #[error("Store error: {0}")]
    Store(String),

    /// Remote verification error
    #[error("Verifier error: {0}")]
    Verifier(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HoptchaError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::UnknownKeyStrategy(_) => 500,
            Self::InvalidMethod(_) => 500,
            Self::Store(_) => 503,
            Self::Verifier(_) => 502,
            Self::InvalidInput(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Verifier(_))
    }

    /// True for errors raised while building configuration
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::UnknownKeyStrategy(_) | Self::InvalidMethod(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(HoptchaError::Store("down".into()).status_code(), 503);
        assert_eq!(HoptchaError::InvalidInput("bad".into()).status_code(), 400);
        assert!(HoptchaError::Store("down".into()).is_retryable());
        assert!(!HoptchaError::UnknownKeyStrategy("x".into()).is_retryable());
        assert!(HoptchaError::UnknownKeyStrategy("x".into()).is_config());
    }

    #[test]
    fn test_display() {
        let err = HoptchaError::UnknownKeyStrategy("cookie".into());
        assert_eq!(err.to_string(), "Unknown key strategy: cookie");
    }
}
