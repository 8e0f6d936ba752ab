//! Machine model

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vmward_api::MachineState;

use crate::error::CoreError;
use crate::events::{EventSink, NoopSink};

/// A user's machine as held by the machine record store
#[derive(Clone)]
pub struct Machine {
    pub id: String,
    /// Owning username
    pub username: String,
    pub state: MachineState,
    pub ip_address: String,
    /// Primary domain name
    pub domain: String,
    /// Identifies the machine's remote agent
    pub query_string: String,
    /// Raw builder configuration, see [`BuilderConfig`]
    pub builder: Value,
    /// Where progress events of the current workflow go
    pub events: Arc<dyn EventSink>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("state", &self.state)
            .field("ip_address", &self.ip_address)
            .field("domain", &self.domain)
            .field("query_string", &self.query_string)
            .field("builder", &self.builder)
            .finish_non_exhaustive()
    }
}

impl Machine {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            state: MachineState::NotInitialized,
            ip_address: String::new(),
            domain: String::new(),
            query_string: String::new(),
            builder: Value::Object(serde_json::Map::new()),
            events: Arc::new(NoopSink),
        }
    }

    #[must_use]
    pub fn with_state(mut self, state: MachineState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = ip.into();
        self
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    #[must_use]
    pub fn with_query_string(mut self, query_string: impl Into<String>) -> Self {
        self.query_string = query_string.into();
        self
    }

    #[must_use]
    pub fn with_builder(mut self, builder: Value) -> Self {
        self.builder = builder;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Decode the builder configuration
    ///
    /// # Errors
    /// Returns `ConfigError` if the blob is not an object or a field has the
    /// wrong type.
    pub fn builder_config(&self) -> Result<BuilderConfig, CoreError> {
        BuilderConfig::from_value(&self.builder)
    }

    /// Whether the machine must never be stopped for inactivity
    ///
    /// A malformed builder counts as not always-on.
    #[must_use]
    pub fn is_always_on(&self) -> bool {
        self.builder_config().is_ok_and(|b| b.always_on)
    }
}

/// Typed builder configuration of a machine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuilderConfig {
    pub region: String,
    pub instance_type: String,
    pub instance_id: String,
    pub instance_name: String,
    /// Keypair name deployed on build and start
    pub key_pair: String,
    #[serde(skip_serializing)]
    pub public_key: String,
    #[serde(skip_serializing)]
    pub private_key: String,
    /// Never stop the machine for inactivity (default `false`)
    pub always_on: bool,
}

impl BuilderConfig {
    /// Decode from a raw blob; `null` decodes to the default configuration
    ///
    /// # Errors
    /// Returns `ConfigError` if the blob is malformed
    pub fn from_value(value: &Value) -> Result<Self, CoreError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Self::deserialize(value)
            .map_err(|e| CoreError::ConfigError(format!("malformed builder configuration: {e}")))
    }
}
