//! Message types for actor communication
//!
//! Each message runs one lifecycle workflow on the receiving machine actor.
//! Handlers are implemented in [`crate::actor::machine`].

use chrono::{DateTime, Utc};
use kameo_macros::Reply;

/// Start the machine's instance
#[derive(Debug, Clone, Copy)]
pub struct StartMachine;

/// Stop the machine's instance
#[derive(Debug, Clone, Copy)]
pub struct StopMachine;

/// Hard restart the machine's instance
#[derive(Debug, Clone, Copy)]
pub struct RestartMachine;

/// Terminate the machine's instance and release its hostnames
#[derive(Debug, Clone, Copy)]
pub struct DestroyMachine;

/// Replace the machine's instance with a fresh build
#[derive(Debug, Clone, Copy)]
pub struct ReinitMachine;

/// Query the actor's bookkeeping
#[derive(Debug, Clone, Copy)]
pub struct GetStatus;

/// Summary of the operations a machine actor has run
#[derive(Debug, Clone, Reply)]
pub struct MachineStatus {
    pub machine_id: String,
    /// Name of the most recent workflow
    pub last_operation: Option<&'static str>,
    /// Error of the most recent workflow, if it failed
    pub last_error: Option<String>,
    /// Workflows run since the actor was spawned
    pub operations: u64,
    /// When the most recent workflow finished
    pub last_finished: Option<DateTime<Utc>>,
}
