//! Machine lifecycle states

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a machine, as stored and as reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    #[default]
    NotInitialized,
    Building,
    Starting,
    Running,
    Stopping,
    Stopped,
    Rebooting,
    Terminating,
    Terminated,
    Unknown,
}

impl MachineState {
    /// Whether the machine is in the middle of a transition
    #[must_use]
    pub fn in_progress(self) -> bool {
        matches!(
            self,
            Self::Building | Self::Starting | Self::Stopping | Self::Rebooting | Self::Terminating
        )
    }

    /// Whether the state is one of `states`
    #[must_use]
    pub fn is_in(self, states: &[MachineState]) -> bool {
        states.contains(&self)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::Building => "building",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Rebooting => "rebooting",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
