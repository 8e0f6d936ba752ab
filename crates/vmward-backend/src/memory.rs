//! In-memory compute backend
//!
//! Keeps instances in a map and follows the usual cloud rules: an instance
//! must be stopped before it can be resized, stopping releases the public
//! address, and starting assigns a fresh one. Failures can be scripted per
//! operation and instance types can be marked as out of capacity. Every
//! call is recorded in order.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, instrument};
use vmward_api::MachineState;

use crate::error::{BackendError, BackendErrorKind};
use crate::info::InstanceInfo;
use crate::traits::ComputeBackend;

/// Backend operation, used to script failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Describe,
    Start,
    Stop,
    Restart,
    Terminate,
    Resize,
}

/// A recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Describe { instance_id: String },
    /// `instance_type` is the type the instance had when start was attempted
    Start { instance_id: String, instance_type: String },
    Stop { instance_id: String, graceful: bool },
    Restart { instance_id: String, graceful: bool },
    Terminate { instance_id: String },
    Resize { instance_id: String, instance_type: String },
}

impl BackendCall {
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::Describe { .. } => Operation::Describe,
            Self::Start { .. } => Operation::Start,
            Self::Stop { .. } => Operation::Stop,
            Self::Restart { .. } => Operation::Restart,
            Self::Terminate { .. } => Operation::Terminate,
            Self::Resize { .. } => Operation::Resize,
        }
    }
}

/// Stored instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryInstance {
    pub state: MachineState,
    pub instance_type: String,
    pub ip_address: Option<String>,
}

impl MemoryInstance {
    pub fn new(state: MachineState, instance_type: impl Into<String>) -> Self {
        Self {
            state,
            instance_type: instance_type.into(),
            ip_address: None,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    instances: HashMap<String, MemoryInstance>,
    exhausted: HashSet<String>,
    failures: HashMap<Operation, VecDeque<BackendError>>,
    calls: Vec<BackendCall>,
    next_host: u8,
}

impl Inner {
    fn take_failure(&mut self, op: Operation) -> Option<BackendError> {
        self.failures.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn instance_mut(&mut self, instance_id: &str) -> Result<&mut MemoryInstance, BackendError> {
        self.instances
            .get_mut(instance_id)
            .ok_or_else(|| BackendError::not_found(instance_id))
    }

    fn allocate_ip(&mut self) -> String {
        self.next_host = self.next_host.wrapping_add(1).max(1);
        format!("10.0.0.{}", self.next_host)
    }

    fn info(instance_id: &str, instance: &MemoryInstance) -> InstanceInfo {
        InstanceInfo {
            instance_id: instance_id.to_string(),
            state: instance.state,
            instance_type: instance.instance_type.clone(),
            ip_address: instance.ip_address.clone(),
        }
    }
}

/// In-memory compute backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance
    #[must_use]
    pub fn with_instance(self, instance_id: impl Into<String>, instance: MemoryInstance) -> Self {
        self.insert(instance_id, instance);
        self
    }

    pub fn insert(&self, instance_id: impl Into<String>, instance: MemoryInstance) {
        self.inner.lock().instances.insert(instance_id.into(), instance);
    }

    /// Current stored view of an instance
    #[must_use]
    pub fn instance(&self, instance_id: &str) -> Option<MemoryInstance> {
        self.inner.lock().instances.get(instance_id).cloned()
    }

    /// Mark instance types as out of capacity; starting with them fails
    pub fn exhaust(&self, instance_types: &[&str]) {
        let mut inner = self.inner.lock();
        inner
            .exhausted
            .extend(instance_types.iter().map(|t| (*t).to_string()));
    }

    /// Make the next call of `op` fail with `error`
    ///
    /// Several failures for the same operation are returned in order.
    pub fn fail_next(&self, op: Operation, error: BackendError) {
        self.inner
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// All calls received so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.inner.lock().calls.clone()
    }

    /// Calls of a single operation, in order
    #[must_use]
    pub fn calls_of(&self, op: Operation) -> Vec<BackendCall> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation() == op)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }
}

#[async_trait]
impl ComputeBackend for MemoryBackend {
    #[instrument(skip(self), level = "debug")]
    async fn describe(&self, instance_id: &str) -> Result<InstanceInfo, BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Describe {
            instance_id: instance_id.to_string(),
        });
        if let Some(err) = inner.take_failure(Operation::Describe) {
            return Err(err);
        }

        let instance = inner.instance_mut(instance_id)?;
        Ok(Inner::info(instance_id, instance))
    }

    #[instrument(skip(self), level = "debug")]
    async fn start(&self, instance_id: &str, _wait: bool) -> Result<InstanceInfo, BackendError> {
        let mut inner = self.inner.lock();
        let instance_type = inner
            .instances
            .get(instance_id)
            .map(|i| i.instance_type.clone())
            .unwrap_or_default();
        inner.calls.push(BackendCall::Start {
            instance_id: instance_id.to_string(),
            instance_type: instance_type.clone(),
        });
        if let Some(err) = inner.take_failure(Operation::Start) {
            return Err(err);
        }
        if inner.exhausted.contains(&instance_type) {
            return Err(BackendError::capacity(format!(
                "insufficient capacity for instance type {instance_type}"
            )));
        }

        let state = inner.instance_mut(instance_id)?.state;
        match state {
            MachineState::Running => {}
            MachineState::Stopped | MachineState::Stopping => {
                let ip = inner.allocate_ip();
                let instance = inner.instance_mut(instance_id)?;
                instance.state = MachineState::Running;
                instance.ip_address = Some(ip);
            }
            other => {
                return Err(BackendError::new(
                    BackendErrorKind::InvalidState,
                    format!("cannot start instance in state {other}"),
                ));
            }
        }

        let instance = inner.instance_mut(instance_id)?;
        debug!(instance_id, instance_type = %instance.instance_type, "instance started");
        Ok(Inner::info(instance_id, instance))
    }

    #[instrument(skip(self), level = "debug")]
    async fn stop(&self, instance_id: &str, graceful: bool) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Stop {
            instance_id: instance_id.to_string(),
            graceful,
        });
        if let Some(err) = inner.take_failure(Operation::Stop) {
            return Err(err);
        }

        let instance = inner.instance_mut(instance_id)?;
        if instance.state == MachineState::Terminated {
            return Err(BackendError::new(
                BackendErrorKind::InvalidState,
                "cannot stop a terminated instance",
            ));
        }
        instance.state = MachineState::Stopped;
        instance.ip_address = None;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn restart(&self, instance_id: &str, graceful: bool) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Restart {
            instance_id: instance_id.to_string(),
            graceful,
        });
        if let Some(err) = inner.take_failure(Operation::Restart) {
            return Err(err);
        }

        let instance = inner.instance_mut(instance_id)?;
        if instance.state != MachineState::Running {
            return Err(BackendError::new(
                BackendErrorKind::InvalidState,
                format!("cannot restart instance in state {}", instance.state),
            ));
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn terminate(&self, instance_id: &str) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Terminate {
            instance_id: instance_id.to_string(),
        });
        if let Some(err) = inner.take_failure(Operation::Terminate) {
            return Err(err);
        }

        let instance = inner.instance_mut(instance_id)?;
        instance.state = MachineState::Terminated;
        instance.ip_address = None;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn resize(&self, instance_id: &str, instance_type: &str) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        inner.calls.push(BackendCall::Resize {
            instance_id: instance_id.to_string(),
            instance_type: instance_type.to_string(),
        });
        if let Some(err) = inner.take_failure(Operation::Resize) {
            return Err(err);
        }

        let instance = inner.instance_mut(instance_id)?;
        if instance.state != MachineState::Stopped {
            return Err(BackendError::new(
                BackendErrorKind::InvalidState,
                format!("instance must be stopped to resize, is {}", instance.state),
            ));
        }
        instance.instance_type = instance_type.to_string();
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped_backend() -> MemoryBackend {
        MemoryBackend::new().with_instance("i-1", MemoryInstance::new(MachineState::Stopped, "t2.micro"))
    }

    #[tokio::test]
    async fn test_start_assigns_address() {
        let backend = stopped_backend();
        let info = backend.start("i-1", true).await.unwrap();

        assert_eq!(info.state, MachineState::Running);
        assert_eq!(info.instance_type, "t2.micro");
        assert!(info.ip_address.is_some());
    }

    #[tokio::test]
    async fn test_stop_releases_address() {
        let backend = stopped_backend();
        backend.start("i-1", true).await.unwrap();
        backend.stop("i-1", true).await.unwrap();

        let instance = backend.instance("i-1").unwrap();
        assert_eq!(instance.state, MachineState::Stopped);
        assert_eq!(instance.ip_address, None);
    }

    #[tokio::test]
    async fn test_exhausted_type_fails_with_capacity() {
        let backend = stopped_backend();
        backend.exhaust(&["t2.micro"]);

        let err = backend.start("i-1", true).await.unwrap_err();
        assert!(err.is_capacity());

        backend.resize("i-1", "t2.small").await.unwrap();
        let info = backend.start("i-1", true).await.unwrap();
        assert_eq!(info.instance_type, "t2.small");
    }

    #[tokio::test]
    async fn test_resize_requires_stopped() {
        let backend = stopped_backend();
        backend.start("i-1", true).await.unwrap();

        let err = backend.resize("i-1", "t2.small").await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let backend = stopped_backend();
        backend.fail_next(
            Operation::Describe,
            BackendError::new(BackendErrorKind::Transport, "first"),
        );
        backend.fail_next(
            Operation::Describe,
            BackendError::new(BackendErrorKind::Transport, "second"),
        );

        assert_eq!(backend.describe("i-1").await.unwrap_err().message, "first");
        assert_eq!(backend.describe("i-1").await.unwrap_err().message, "second");
        assert!(backend.describe("i-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_instance() {
        let backend = MemoryBackend::new();
        let err = backend.terminate("i-404").await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_calls_are_recorded() {
        let backend = stopped_backend();
        backend.resize("i-1", "t2.small").await.unwrap();
        backend.start("i-1", true).await.unwrap();

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::Resize {
                    instance_id: "i-1".to_string(),
                    instance_type: "t2.small".to_string(),
                },
                BackendCall::Start {
                    instance_id: "i-1".to_string(),
                    instance_type: "t2.small".to_string(),
                },
            ]
        );
        assert_eq!(backend.calls_of(Operation::Start).len(), 1);
    }
}
