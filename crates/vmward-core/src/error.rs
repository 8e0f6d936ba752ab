//! Core error types for vmward-core

use thiserror::Error;
use vmward_backend::BackendError;
use vmward_dns::DnsError;

use crate::store::StoreError;

/// Errors that can end a lifecycle workflow
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Machine or provider configuration is malformed
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// No compute client is registered for the machine's region
    #[error("no compute backend available for region {region}")]
    BackendUnavailable {
        /// Requested region
        region: String,
    },

    /// Describing the instance failed
    #[error("backend query failed: {0}")]
    BackendQueryError(#[source] BackendError),

    /// A required state-changing backend call failed
    #[error("backend mutation failed: {0}")]
    BackendMutationError(#[source] BackendError),

    /// Every fallback instance type was out of capacity
    #[error("no other instance types are available (tried {tried:?})")]
    NoCapacityAvailable {
        /// Fallback types attempted, in order
        tried: Vec<String>,
    },

    /// Plan check refused the operation
    #[error("not allowed: {0}")]
    AuthorizationDenied(String),

    /// DNS validation failed where it is fatal
    #[error("domain error: {0}")]
    DnsError(#[from] DnsError),

    /// Machine record store failed
    #[error("machine store error: {0}")]
    StoreError(String),

    /// Machine record does not exist
    #[error("machine not found: {0}")]
    MachineNotFound(String),

    /// Rebuild collaborator failed
    #[error("build failed: {0}")]
    BuildError(String),

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),
}

impl CoreError {
    /// Check if the error is a capacity failure of a backend mutation
    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(self, CoreError::BackendMutationError(e) if e.is_capacity())
    }

    /// Backend error carried by this error, if any
    #[must_use]
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            CoreError::BackendQueryError(e) | CoreError::BackendMutationError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => CoreError::MachineNotFound(id),
            other => CoreError::StoreError(other.to_string()),
        }
    }
}
