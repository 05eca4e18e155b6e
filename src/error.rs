use std::time::Duration;

use thiserror::Error;

use crate::auth::AuthStep;
use crate::config::{BackendKind, ResearchSite};

pub type Result<T> = std::result::Result<T, ScrapingError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScrapingError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Authentication error during {step}: {message}")]
    Authentication { step: AuthStep, message: String },

    #[error("Element not found: {what} (tried {} candidates: {})", .candidates.len(), .candidates.join(", "))]
    ElementNotFound { what: String, candidates: Vec<String> },

    #[error("No response text observed within {waited:?}")]
    ResponseTimeout { waited: Duration },

    #[error("Site {site} is not supported by the {backend} backend")]
    UnsupportedSite {
        site: ResearchSite,
        backend: BackendKind,
    },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Agent error: {0}")]
    Agent(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Tear the attempt down and run the whole sequence again.
    RetryAttempt,
    /// Retrying cannot change the outcome.
    Abort,
}

impl ScrapingError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            ScrapingError::Configuration(_) => RecoveryStrategy::Abort,
            ScrapingError::UnsupportedSite { .. } => RecoveryStrategy::Abort,
            ScrapingError::Setup(_) => RecoveryStrategy::RetryAttempt,
            ScrapingError::Authentication { .. } => RecoveryStrategy::RetryAttempt,
            ScrapingError::ElementNotFound { .. } => RecoveryStrategy::RetryAttempt,
            ScrapingError::ResponseTimeout { .. } => RecoveryStrategy::RetryAttempt,
            ScrapingError::Browser(_) => RecoveryStrategy::RetryAttempt,
            ScrapingError::Agent(_) => RecoveryStrategy::RetryAttempt,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.recovery_strategy() == RecoveryStrategy::RetryAttempt
    }

    pub fn authentication(step: AuthStep, message: impl Into<String>) -> Self {
        ScrapingError::Authentication {
            step,
            message: message.into(),
        }
    }
}

// Conversion implementations for common error types
impl From<std::io::Error> for ScrapingError {
    fn from(err: std::io::Error) -> Self {
        ScrapingError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for ScrapingError {
    fn from(err: serde_json::Error) -> Self {
        ScrapingError::Agent(err.to_string())
    }
}

impl From<toml::de::Error> for ScrapingError {
    fn from(err: toml::de::Error) -> Self {
        ScrapingError::Configuration(err.to_string())
    }
}

impl From<config::ConfigError> for ScrapingError {
    fn from(err: config::ConfigError) -> Self {
        ScrapingError::Configuration(err.to_string())
    }
}

impl From<reqwest::Error> for ScrapingError {
    fn from(err: reqwest::Error) -> Self {
        ScrapingError::Agent(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for ScrapingError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScrapingError::Browser(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_abort() {
        let config_err = ScrapingError::Configuration("missing password".to_string());
        assert_eq!(config_err.recovery_strategy(), RecoveryStrategy::Abort);

        let unsupported = ScrapingError::UnsupportedSite {
            site: ResearchSite::Perplexity,
            backend: BackendKind::Agent,
        };
        assert!(!unsupported.is_retryable());
    }

    #[test]
    fn test_attempt_errors_retry() {
        let errors = vec![
            ScrapingError::Setup("launch failed".to_string()),
            ScrapingError::authentication(AuthStep::EnteringEmail, "no email field"),
            ScrapingError::ElementNotFound {
                what: "query input".to_string(),
                candidates: vec!["textarea".to_string()],
            },
            ScrapingError::ResponseTimeout {
                waited: Duration::from_secs(15),
            },
            ScrapingError::Browser("target closed".to_string()),
            ScrapingError::Agent("503".to_string()),
        ];

        for err in errors {
            assert!(err.is_retryable(), "{} should be retryable", err);
        }
    }

    #[test]
    fn test_error_messages_name_the_step() {
        let err = ScrapingError::authentication(AuthStep::EnteringPassword, "password field missing");
        let msg = err.to_string();
        assert!(msg.contains("password"), "unexpected message: {}", msg);

        let err = ScrapingError::ElementNotFound {
            what: "response container".to_string(),
            candidates: vec![".a".to_string(), ".b".to_string()],
        };
        assert!(err.to_string().contains("tried 2 candidates"));
    }
}
