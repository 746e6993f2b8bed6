//! Error types for the operator.
//!
//! Every failure in a reconciliation pass degrades to a [`UnitStatus`]; none
//! of them terminates the agent.

use std::fmt;

use thiserror::Error;

use crate::reconciler::UnitStatus;

/// Which side of an integration a schema violation was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Payload we were about to publish.
    Outbound,
    /// Payload published by the remote application.
    Inbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outbound => write!(f, "outbound"),
            Direction::Inbound => write!(f, "inbound"),
        }
    }
}

/// Main error type for operator operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed option or connector definition; the user must fix configuration.
    #[error("{0}")]
    Validation(String),

    /// Relation payload missing required fields.
    #[error("{integration}: {message}")]
    Schema {
        integration: String,
        message: String,
        direction: Direction,
    },

    /// Workload or dependency not yet available.
    #[error("{0}")]
    NotReady(String),

    /// Remote relation side misbehaving.
    #[error("{0}")]
    Upstream(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a schema error for a payload received from a remote application
    pub fn inbound_schema(integration: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Schema {
            integration: integration.into(),
            message: msg.into(),
            direction: Direction::Inbound,
        }
    }

    /// Create a schema error for a payload we were about to publish
    pub fn outbound_schema(integration: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Schema {
            integration: integration.into(),
            message: msg.into(),
            direction: Direction::Outbound,
        }
    }

    /// Create a not-ready error with the given message
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    /// Create an upstream error with the given message
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// Whether the next event is expected to resolve this without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NotReady(_)
                | Error::Upstream(_)
                | Error::Schema {
                    direction: Direction::Inbound,
                    ..
                }
        )
    }

    /// Map the error to the status reported for the unit.
    pub fn status(&self) -> UnitStatus {
        if self.is_retryable() {
            UnitStatus::waiting(self.to_string())
        } else {
            UnitStatus::blocked(self.to_string())
        }
    }
}

/// Result type alias for operator operations
pub type Result<T> = std::result::Result<T, Error>;
