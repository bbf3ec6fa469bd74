//! Error types shared by every component of the harness.

use std::time::Duration;

use thiserror::Error;

use crate::platform::PlatformError;

/// Result alias used throughout the crate.
pub type Result<T, E = E2eError> = std::result::Result<T, E>;

/// Errors surfaced to scenarios and the suite runner.
///
/// Transient platform failures never appear here from a wait: the poller
/// absorbs them until its deadline.
#[derive(Error, Debug)]
pub enum E2eError {
    /// A condition was never satisfied before the deadline.
    #[error("Timed out after {elapsed:?} waiting for {condition}; last observed: {last_observed}")]
    TimeoutExceeded {
        condition: String,
        elapsed: Duration,
        last_observed: String,
        /// Controller log tail captured at the time of the timeout, if any.
        diagnostics: Option<String>,
    },

    /// A final-state assertion failed after convergence was observed.
    #[error("Invariant violated: {0}")]
    InvariantViolated(String),

    /// The controller did not come back after a restart.
    #[error("Fatal infrastructure failure: {0}")]
    FatalInfrastructure(String),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl E2eError {
    /// Whether later scenarios must not run against the cluster after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalInfrastructure(_))
    }

    /// Whether this error is a platform failure worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Platform(e) if e.is_transient())
    }

    /// Attach a controller log tail to a timeout. Other kinds are returned unchanged.
    #[must_use]
    pub fn with_diagnostics(self, log_tail: Option<String>) -> Self {
        match self {
            Self::TimeoutExceeded {
                condition,
                elapsed,
                last_observed,
                diagnostics,
            } => Self::TimeoutExceeded {
                condition,
                elapsed,
                last_observed,
                diagnostics: log_tail.or(diagnostics),
            },
            other => other,
        }
    }

    /// Diagnostic text carried by the error, if any.
    #[must_use]
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::TimeoutExceeded { diagnostics, .. } => diagnostics.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeout() -> E2eError {
        E2eError::TimeoutExceeded {
            condition: "3 pods".to_string(),
            elapsed: Duration::from_secs(30),
            last_observed: "2".to_string(),
            diagnostics: None,
        }
    }

    #[test]
    fn test_with_diagnostics_only_touches_timeouts() {
        let err = timeout().with_diagnostics(Some("operator log".to_string()));
        assert_eq!(err.diagnostics(), Some("operator log"));

        let err = E2eError::InvariantViolated("two primaries".to_string())
            .with_diagnostics(Some("operator log".to_string()));
        assert_eq!(err.diagnostics(), None);
    }

    #[test]
    fn test_with_diagnostics_keeps_existing_when_none_given() {
        let err = timeout()
            .with_diagnostics(Some("first".to_string()))
            .with_diagnostics(None);
        assert_eq!(err.diagnostics(), Some("first"));
    }

    #[test]
    fn test_only_fatal_infrastructure_is_fatal() {
        assert!(E2eError::FatalInfrastructure("gone".to_string()).is_fatal());
        assert!(!timeout().is_fatal());
        assert!(!E2eError::InvariantViolated("x".to_string()).is_fatal());
    }

    #[test]
    fn test_timeout_message_names_condition_and_state() {
        let message = timeout().to_string();
        assert!(message.contains("3 pods"));
        assert!(message.contains("last observed: 2"));
    }
}
