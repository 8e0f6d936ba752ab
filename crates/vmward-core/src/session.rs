//! Instance session
//!
//! A short-lived handle bound to one machine for the duration of one
//! workflow. It owns the region-scoped backend client and a private copy of
//! the machine's builder configuration, and it is never shared.

use std::sync::Arc;

use tracing::{debug, warn};
use vmward_api::{Artifact, MachineState, ProgressEvent};
use vmward_backend::{BackendError, ClientPool, ComputeBackend, InstanceInfo};

use crate::config::ProviderConfig;
use crate::error::CoreError;
use crate::events::EventSink;
use crate::machine::{BuilderConfig, Machine};

/// Percentage interval a sub-operation may report progress into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushRange {
    pub start: u8,
    pub finish: u8,
}

impl PushRange {
    #[must_use]
    pub fn new(start: u8, finish: u8) -> Self {
        Self { start, finish }
    }

    /// Same start, finish scaled down to 80% so the caller keeps the tail
    #[must_use]
    pub fn reserve_tail(self) -> Self {
        let finish = u16::from(self.finish) * 8 / 10;
        Self {
            start: self.start,
            finish: u8::try_from(finish).unwrap_or(self.finish),
        }
    }
}

/// Per-workflow handle on a machine's instance
pub struct InstanceSession {
    machine_id: String,
    username: String,
    builder: BuilderConfig,
    client: Arc<dyn ComputeBackend>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for InstanceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceSession")
            .field("machine_id", &self.machine_id)
            .field("username", &self.username)
            .field("region", &self.builder.region)
            .field("instance_id", &self.builder.instance_id)
            .field("backend", &self.client.backend_type())
            .finish_non_exhaustive()
    }
}

impl InstanceSession {
    /// Open a session for `machine`
    ///
    /// # Errors
    /// `ConfigError` when the builder blob is malformed, `BackendUnavailable`
    /// when no client serves the machine's region.
    pub fn open(
        machine: &Machine,
        clients: &ClientPool,
        config: &ProviderConfig,
    ) -> Result<Self, CoreError> {
        let mut builder = machine.builder_config()?;

        if builder.region.is_empty() {
            warn!(
                machine = %machine.id,
                region = %config.default_region,
                "region is not set, using default region"
            );
            builder.region.clone_from(&config.default_region);
        }

        let client = clients
            .region(&builder.region)
            .ok_or_else(|| CoreError::BackendUnavailable {
                region: builder.region.clone(),
            })?;

        builder.key_pair.clone_from(&config.keys.key_name);
        builder.public_key.clone_from(&config.keys.public_key);
        builder.private_key.clone_from(&config.keys.private_key);

        Ok(Self {
            machine_id: machine.id.clone(),
            username: machine.username.clone(),
            builder,
            client,
            events: machine.events.clone(),
        })
    }

    #[must_use]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    #[must_use]
    pub fn builder(&self) -> &BuilderConfig {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut BuilderConfig {
        &mut self.builder
    }

    #[must_use]
    pub fn client(&self) -> &Arc<dyn ComputeBackend> {
        &self.client
    }

    /// Report progress to the machine's event sink
    pub fn push(&self, message: &str, percentage: u8, status: MachineState) {
        debug!(
            machine = %self.machine_id,
            user = %self.username,
            percentage,
            status = %status,
            "{message}"
        );
        self.events
            .push(ProgressEvent::new(&self.machine_id, message, percentage, status));
    }

    /// Describe the instance
    ///
    /// # Errors
    /// Returns `BackendQueryError` if the backend call fails
    pub async fn info(&self) -> Result<InstanceInfo, CoreError> {
        self.client
            .describe(&self.builder.instance_id)
            .await
            .map_err(CoreError::BackendQueryError)
    }

    /// Start the instance and describe the result
    ///
    /// # Errors
    /// Returns the backend error unchanged
    pub async fn start(&self, wait: bool) -> Result<Artifact, BackendError> {
        let info = self.client.start(&self.builder.instance_id, wait).await?;
        Ok(Artifact {
            ip_address: info.ip_address.unwrap_or_default(),
            instance_id: info.instance_id,
            domain_name: String::new(),
            instance_type: info.instance_type,
        })
    }

    /// Gracefully stop the instance
    ///
    /// # Errors
    /// Returns the backend error unchanged
    pub async fn stop(&self) -> Result<(), BackendError> {
        self.client.stop(&self.builder.instance_id, true).await
    }

    /// Hard restart the instance
    ///
    /// # Errors
    /// Returns the backend error unchanged
    pub async fn restart(&self) -> Result<(), BackendError> {
        self.client.restart(&self.builder.instance_id, false).await
    }

    /// # Errors
    /// Returns the backend error unchanged
    pub async fn resize(&self, instance_type: &str) -> Result<(), BackendError> {
        self.client
            .resize(&self.builder.instance_id, instance_type)
            .await
    }

    /// Terminate the instance, reporting progress only within `range`
    ///
    /// # Errors
    /// Returns the backend error unchanged
    pub async fn terminate(&self, range: PushRange) -> Result<(), BackendError> {
        self.push("Terminating instance", range.start, MachineState::Terminating);
        self.client.terminate(&self.builder.instance_id).await?;
        self.push("Instance terminated", range.finish, MachineState::Terminated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use vmward_backend::{MemoryBackend, MemoryInstance};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl EventSink for Recorder {
        fn push(&self, event: ProgressEvent) {
            self.0.lock().push(event);
        }
    }

    fn pool() -> ClientPool {
        let backend = MemoryBackend::new()
            .with_instance("i-1", MemoryInstance::new(MachineState::Running, "t2.micro"));
        ClientPool::new().with_region("us-east-1", Arc::new(backend))
    }

    #[test]
    fn test_reserve_tail() {
        assert_eq!(PushRange::new(10, 80).reserve_tail(), PushRange::new(10, 64));
        assert_eq!(PushRange::new(10, 40).reserve_tail(), PushRange::new(10, 32));
        assert_eq!(PushRange::new(0, 99).reserve_tail(), PushRange::new(0, 79));
    }

    #[test]
    fn test_open_falls_back_to_default_region_and_injects_keys() {
        let mut config = ProviderConfig::new(["t2.small"]);
        config.keys.key_name = "vmward".to_string();
        config.keys.private_key = "secret".to_string();
        let machine = Machine::new("m-1", "alice").with_builder(json!({ "instanceId": "i-1" }));

        let session = InstanceSession::open(&machine, &pool(), &config).unwrap();
        assert_eq!(session.builder().region, "us-east-1");
        assert_eq!(session.builder().key_pair, "vmward");
        assert_eq!(session.builder().private_key, "secret");
        assert!(!format!("{session:?}").contains("secret"));
    }

    #[test]
    fn test_open_unknown_region() {
        let config = ProviderConfig::new(Vec::<String>::new());
        let machine = Machine::new("m-1", "alice")
            .with_builder(json!({ "instanceId": "i-1", "region": "ap-south-1" }));

        let err = InstanceSession::open(&machine, &pool(), &config).unwrap_err();
        assert!(matches!(err, CoreError::BackendUnavailable { region } if region == "ap-south-1"));
    }

    #[test]
    fn test_open_malformed_builder() {
        let config = ProviderConfig::new(Vec::<String>::new());
        let machine = Machine::new("m-1", "alice").with_builder(json!(["not", "an", "object"]));

        let err = InstanceSession::open(&machine, &pool(), &config).unwrap_err();
        assert!(matches!(err, CoreError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_terminate_reports_within_range() {
        let recorder = Arc::new(Recorder::default());
        let config = ProviderConfig::new(Vec::<String>::new());
        let machine = Machine::new("m-1", "alice")
            .with_builder(json!({ "instanceId": "i-1" }))
            .with_events(recorder.clone());

        let session = InstanceSession::open(&machine, &pool(), &config).unwrap();
        session
            .terminate(PushRange::new(10, 80).reserve_tail())
            .await
            .unwrap();

        let percentages: Vec<u8> = recorder.0.lock().iter().map(|e| e.percentage).collect();
        assert_eq!(percentages, vec![10, 64]);
        assert!(recorder.0.lock().iter().all(|e| e.machine_id == "m-1"));
    }
}
