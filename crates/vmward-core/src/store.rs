//! Machine record store
//!
//! Writes issued after a backend state change are advisory: the provider
//! logs and swallows their errors, so a store outage never undoes or aborts
//! a transition that already happened at the backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use vmward_api::MachineState;

use crate::events::NoopSink;
use crate::machine::Machine;

/// Errors that can occur in the machine record store
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("machine not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Stage a partial update belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Starting,
    Building,
}

impl UpdateKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Building => "building",
        }
    }
}

/// Machine fields to overwrite; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineFields {
    pub ip_address: Option<String>,
    pub instance_id: Option<String>,
    pub instance_name: Option<String>,
    pub instance_type: Option<String>,
    pub query_string: Option<String>,
}

/// Partial update of a machine record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageUpdate {
    pub kind: UpdateKind,
    pub fields: MachineFields,
}

impl StorageUpdate {
    /// Intermediate data written once an instance is up
    pub fn starting(ip_address: impl Into<String>, instance_type: impl Into<String>) -> Self {
        Self {
            kind: UpdateKind::Starting,
            fields: MachineFields {
                ip_address: Some(ip_address.into()),
                instance_type: Some(instance_type.into()),
                ..MachineFields::default()
            },
        }
    }

    /// Clears everything tied to the old instance before a rebuild
    #[must_use]
    pub fn building_reset() -> Self {
        Self {
            kind: UpdateKind::Building,
            fields: MachineFields {
                ip_address: Some(String::new()),
                instance_id: Some(String::new()),
                instance_name: Some(String::new()),
                instance_type: None,
                query_string: Some(String::new()),
            },
        }
    }
}

/// Persistent store of machine records
#[async_trait]
pub trait MachineStore: Send + Sync {
    /// Fetch a fresh copy of a machine
    async fn get(&self, id: &str) -> Result<Machine, StoreError>;

    /// Apply a partial update
    async fn update(&self, id: &str, update: StorageUpdate) -> Result<(), StoreError>;

    /// Record a lifecycle state change together with its reason
    async fn update_state(&self, id: &str, reason: &str, state: MachineState) -> Result<(), StoreError>;
}

/// A recorded state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub state: MachineState,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Stored machine with its bookkeeping
#[derive(Debug, Clone)]
pub struct StoredMachine {
    pub machine: Machine,
    pub last_update: Option<UpdateKind>,
    pub history: Vec<StateChange>,
}

#[derive(Default)]
struct StoreInner {
    machines: HashMap<String, StoredMachine>,
    fail_writes: bool,
    reads: usize,
}

/// In-memory machine record store
#[derive(Default)]
pub struct MemoryMachineStore {
    inner: Mutex<StoreInner>,
}

impl MemoryMachineStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, machine: Machine) {
        let mut machine = machine;
        machine.events = Arc::new(NoopSink);
        self.inner.lock().machines.insert(
            machine.id.clone(),
            StoredMachine {
                machine,
                last_update: None,
                history: Vec::new(),
            },
        );
    }

    #[must_use]
    pub fn stored(&self, id: &str) -> Option<StoredMachine> {
        self.inner.lock().machines.get(id).cloned()
    }

    /// States recorded for a machine, oldest first
    #[must_use]
    pub fn states(&self, id: &str) -> Vec<(MachineState, String)> {
        self.inner
            .lock()
            .machines
            .get(id)
            .map(|m| {
                m.history
                    .iter()
                    .map(|c| (c.state, c.reason.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of `get` calls received
    #[must_use]
    pub fn reads(&self) -> usize {
        self.inner.lock().reads
    }

    /// Make every write fail
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }
}

fn set_builder_field(builder: &mut Value, key: &str, value: &str) {
    if !builder.is_object() {
        *builder = Value::Object(serde_json::Map::new());
    }
    if let Some(map) = builder.as_object_mut() {
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
}

#[async_trait]
impl MachineStore for MemoryMachineStore {
    async fn get(&self, id: &str) -> Result<Machine, StoreError> {
        let mut inner = self.inner.lock();
        inner.reads += 1;
        inner
            .machines
            .get(id)
            .map(|m| m.machine.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update(&self, id: &str, update: StorageUpdate) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        let stored = inner
            .machines
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let fields = update.fields;
        let machine = &mut stored.machine;
        if let Some(ip) = fields.ip_address {
            machine.ip_address = ip;
        }
        if let Some(query_string) = fields.query_string {
            machine.query_string = query_string;
        }
        if let Some(instance_id) = fields.instance_id {
            set_builder_field(&mut machine.builder, "instanceId", &instance_id);
        }
        if let Some(instance_name) = fields.instance_name {
            set_builder_field(&mut machine.builder, "instanceName", &instance_name);
        }
        if let Some(instance_type) = fields.instance_type {
            set_builder_field(&mut machine.builder, "currentInstanceType", &instance_type);
        }
        stored.last_update = Some(update.kind);
        Ok(())
    }

    async fn update_state(&self, id: &str, reason: &str, state: MachineState) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        let stored = inner
            .machines
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        stored.machine.state = state;
        stored.history.push(StateChange {
            state,
            reason: reason.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }
}
