//! Compute backend trait

use async_trait::async_trait;

use crate::error::BackendError;
use crate::info::InstanceInfo;

/// Instance control primitives of a region-scoped compute backend client
///
/// Implementations classify their failures at the point of origin by
/// setting a [`BackendErrorKind`](crate::BackendErrorKind).
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Describe the current state, type and address of an instance
    async fn describe(&self, instance_id: &str) -> Result<InstanceInfo, BackendError>;

    /// Start a stopped instance, optionally waiting until it is running
    async fn start(&self, instance_id: &str, wait: bool) -> Result<InstanceInfo, BackendError>;

    /// Stop an instance; `graceful` requests an OS shutdown before power-off
    async fn stop(&self, instance_id: &str, graceful: bool) -> Result<(), BackendError>;

    /// Restart an instance
    async fn restart(&self, instance_id: &str, graceful: bool) -> Result<(), BackendError>;

    /// Terminate an instance permanently
    async fn terminate(&self, instance_id: &str) -> Result<(), BackendError>;

    /// Change the instance type in place
    async fn resize(&self, instance_id: &str, instance_type: &str) -> Result<(), BackendError>;

    /// Get backend type name
    fn backend_type(&self) -> &'static str;
}
