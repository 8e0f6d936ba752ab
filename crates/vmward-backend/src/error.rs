//! Error types for vmward-backend

use std::fmt;

use thiserror::Error;

/// Classification of a backend failure, set where the failure originates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    /// The requested instance type is temporarily out of capacity
    InsufficientCapacity,
    /// The account hit its instance limit for the requested type
    InstanceLimitExceeded,
    /// Network or API transport failure
    Transport,
    /// Instance does not exist
    NotFound,
    /// Instance is not in a state that allows the operation
    InvalidState,
    /// Credentials lack permission for the operation
    PermissionDenied,
    /// Anything else
    Other,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InsufficientCapacity => "insufficient capacity",
            Self::InstanceLimitExceeded => "instance limit exceeded",
            Self::Transport => "transport",
            Self::NotFound => "not found",
            Self::InvalidState => "invalid state",
            Self::PermissionDenied => "permission denied",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Error returned by a [`ComputeBackend`](crate::ComputeBackend) call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct BackendError {
    /// Failure classification
    pub kind: BackendErrorKind,
    /// Backend-provided detail
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn capacity(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::InsufficientCapacity, message)
    }

    pub fn not_found(instance_id: &str) -> Self {
        Self::new(
            BackendErrorKind::NotFound,
            format!("instance {instance_id} does not exist"),
        )
    }

    /// Check if the error means the requested size is unavailable right now
    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::InsufficientCapacity | BackendErrorKind::InstanceLimitExceeded
        )
    }

    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_capacity() || self.kind == BackendErrorKind::Transport
    }
}
