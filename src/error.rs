//! Error types for the map viewer session lifecycle
//!
//! Contract violations (`AlreadyActive`, `NoActiveSession`, `ShutDown`) are
//! returned to the caller of the lifecycle API. Degradations that the system
//! absorbs (`DisposalTimeout`, `TickFailure`) are never returned; they exist
//! so the logging and audit channels can describe what happened.

use std::time::Duration;

use thiserror::Error;

use crate::session::SessionId;

/// Errors surfaced synchronously by the lifecycle coordinator
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("A session is already active at generation {generation}")]
    AlreadyActive { generation: u64 },

    #[error("No active session")]
    NoActiveSession,

    #[error("The coordinator has been shut down")]
    ShutDown,

    #[error("Renderer error: {0}")]
    Render(#[from] RenderError),

    #[error("Failed to start refresh scheduler: {0}")]
    Scheduler(#[from] std::io::Error),
}

/// Errors reported by a renderer hook
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Session {0} has been disposed")]
    Disposed(SessionId),

    #[error("Redraw request rejected: {0}")]
    Redraw(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Renderer does not support {0}")]
    Unsupported(&'static str),
}

/// A tick that failed inside the refresh scheduler.
///
/// Caught, logged and counted; the scheduler keeps running.
#[derive(Error, Debug)]
pub enum TickFailure {
    #[error("Redraw failed at generation {generation}: {source}")]
    Redraw {
        generation: u64,
        #[source]
        source: RenderError,
    },

    #[error("Tick panicked: {0}")]
    Panicked(String),
}

/// The grace period elapsed while a tick still held the retired generation.
///
/// Disposal proceeds anyway; this value is logged and audited.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Grace period of {grace:?} elapsed with {in_flight} tick(s) still holding generation {generation}")]
pub struct DisposalTimeout {
    pub generation: u64,
    pub grace: Duration,
    pub in_flight: usize,
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Coordinate string parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinateError {
    #[error("Expected two comma-separated values, found {0}")]
    WrongArity(usize),

    #[error("Invalid coordinate '{0}'")]
    InvalidNumber(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_converts_into_lifecycle_error() {
        let err: LifecycleError = RenderError::Unsupported("capture").into();
        assert!(matches!(err, LifecycleError::Render(_)));
        assert_eq!(
            err.to_string(),
            "Renderer error: Renderer does not support capture"
        );
    }

    #[test]
    fn test_disposal_timeout_message() {
        let timeout = DisposalTimeout {
            generation: 3,
            grace: Duration::from_millis(100),
            in_flight: 1,
        };
        assert!(timeout.to_string().contains("generation 3"));
        assert!(timeout.to_string().contains("100ms"));
    }
}
