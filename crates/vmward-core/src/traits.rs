//! Collaborator traits consumed by the provider

use async_trait::async_trait;
use vmward_api::Artifact;

use crate::error::CoreError;
use crate::machine::Machine;
use crate::session::{InstanceSession, PushRange};

/// Plan and quota checkpoint
#[async_trait]
pub trait PlanChecker: Send + Sync {
    /// Check whether the machine's owner may run it; `Err` carries the denial reason
    async fn always_on(&self, machine: &Machine) -> Result<(), String>;
}

/// Plan checker that never denies
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl PlanChecker for AllowAll {
    async fn always_on(&self, _machine: &Machine) -> Result<(), String> {
        Ok(())
    }
}

/// Reachability check of a machine's remote agent
#[async_trait]
pub trait AgentProbe: Send + Sync {
    async fn is_reachable(&self, query_string: &str) -> bool;
}

/// Rebuilds a machine on a fresh instance
#[async_trait]
pub trait Rebuilder: Send + Sync {
    /// Build a new instance for `machine`, reporting progress within `range`
    async fn run(
        &self,
        session: &mut InstanceSession,
        machine: &mut Machine,
        range: PushRange,
    ) -> Result<Artifact, CoreError>;
}

/// Per-machine mutual exclusion
#[async_trait]
pub trait MachineLocker: Send + Sync {
    /// Wait until the machine's lock is held
    async fn lock(&self, machine_id: &str);

    /// Release the machine's lock; no-op when not held
    async fn unlock(&self, machine_id: &str);
}
