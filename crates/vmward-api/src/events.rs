//! Progress event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::MachineState;

/// Progress report emitted while a workflow drives a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub machine_id: String,
    pub message: String,
    pub percentage: u8,
    pub status: MachineState,
    pub at: DateTime<Utc>,
}

impl ProgressEvent {
    /// Create an event stamped with the current time
    pub fn new(
        machine_id: impl Into<String>,
        message: impl Into<String>,
        percentage: u8,
        status: MachineState,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            message: message.into(),
            percentage,
            status,
            at: Utc::now(),
        }
    }
}
