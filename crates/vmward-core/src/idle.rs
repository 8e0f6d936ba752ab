//! Idle monitor
//!
//! Stops machines whose remote agent stays unreachable for the configured
//! timeout. Timers are keyed by the agent's query string and live in the
//! provider's [`Scheduler`](crate::scheduler::Scheduler). A firing timer only
//! holds a weak reference to the provider and re-validates everything against
//! fresh data before it stops anything.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vmward_api::MachineState;

use crate::error::CoreError;
use crate::events::NoopSink;
use crate::lock::run_exclusive;
use crate::machine::Machine;
use crate::provider::Provider;

const STOPPING_REASON: &str = "Stopping process started due to inactive agent after idle timeout.";
const STOPPED_REASON: &str = "Stopped due to inactive and unreachable agent after idle timeout.";

/// How a fired idle timer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// Machine was stopped
    Stopped,
    /// Timer was cancelled while re-validating
    Cancelled,
    /// Another operation is driving the instance
    InProgress(MachineState),
    AlreadyStopped,
    /// Remote agent answered again
    AgentReconnected,
}

impl IdleOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Cancelled => "cancelled",
            Self::InProgress(_) => "in_progress",
            Self::AlreadyStopped => "already_stopped",
            Self::AgentReconnected => "agent_reconnected",
        }
    }
}

impl Provider {
    /// Arm the idle timer for `machine`
    ///
    /// No-op for always-on machines, machines without a query string and
    /// machines that already have a live timer. Returns whether a timer was
    /// armed.
    pub fn start_timer(self: &Arc<Self>, machine: &Machine) -> bool {
        if machine.is_always_on() || machine.query_string.is_empty() {
            return false;
        }
        if self.scheduler.is_armed(&machine.query_string) {
            return false;
        }

        let provider = Arc::downgrade(self);
        let machine_id = machine.id.clone();
        let armed = self.scheduler.arm(
            &machine.query_string,
            self.config.idle.timeout(),
            move |token| async move {
                let Some(provider) = provider.upgrade() else {
                    return;
                };
                match provider.stop_inactive(&machine_id, &token).await {
                    Ok(IdleOutcome::InProgress(state)) => {
                        info!(machine = %machine_id, state = %state, "idle stop aborted, machine is in progress");
                    }
                    Ok(outcome) => {
                        info!(machine = %machine_id, outcome = outcome.as_str(), "idle timer finished");
                    }
                    Err(e) => {
                        error!(machine = %machine_id, error = %e, "idle stop failed");
                    }
                }
            },
        );

        if armed {
            info!(
                machine = %machine.id,
                user = %machine.username,
                timeout_secs = self.config.idle.timeout_secs,
                "remote agent is not running, adding to inactive machines"
            );
        }
        armed
    }

    /// Cancel the idle timer for `machine`; no-op when none is armed
    pub fn stop_timer(&self, machine: &Machine) {
        if self.scheduler.cancel(&machine.query_string) {
            info!(machine = %machine.id, query_string = %machine.query_string, "stopped inactive machine timer");
        }
    }

    /// Re-validate a machine whose idle timer fired and stop it if still idle
    ///
    /// Each check runs against fresh data; the token is consulted after every
    /// check and once more after the machine lock is taken. The locked part
    /// runs through [`run_exclusive`], so a panic there can't leave the
    /// machine locked.
    ///
    /// # Errors
    /// Returns an error if the machine can't be loaded or described, or
    /// `ActorError` if the locked stop panicked
    pub async fn stop_inactive(
        self: &Arc<Self>,
        machine_id: &str,
        token: &CancellationToken,
    ) -> Result<IdleOutcome, CoreError> {
        let mut machine = self.store.get(machine_id).await?;
        machine.events = Arc::new(NoopSink);
        if token.is_cancelled() {
            return Ok(IdleOutcome::Cancelled);
        }

        info!(machine = %machine.id, user = %machine.username, "idle timeout passed, rechecking before stopping");

        let session = self.open_session(&machine)?;
        let info = session.info().await?;
        if token.is_cancelled() {
            return Ok(IdleOutcome::Cancelled);
        }

        if info.state.in_progress() {
            return Ok(IdleOutcome::InProgress(info.state));
        }
        if info.state == MachineState::Stopped {
            info!(machine = %machine.id, "idle stop aborted, machine is already stopped");
            return Ok(IdleOutcome::AlreadyStopped);
        }
        if info.state == MachineState::Running && self.agent.is_reachable(&machine.query_string).await {
            info!(machine = %machine.id, "idle stop aborted, remote agent is reachable again");
            return Ok(IdleOutcome::AgentReconnected);
        }
        if token.is_cancelled() {
            return Ok(IdleOutcome::Cancelled);
        }

        let provider = self.clone();
        let token = token.clone();
        let machine_id = machine.id.clone();
        let task = async move {
            if token.is_cancelled() {
                return Ok(IdleOutcome::Cancelled);
            }

            provider
                .advisory_state(&machine.id, STOPPING_REASON, MachineState::Stopping)
                .await;

            info!(machine = %machine.id, user = %machine.username, "stopping machine after idle timeout");
            if let Err(e) = provider.stop(&machine).await {
                warn!(machine = %machine.id, error = %e, "could not stop idle machine");
            }

            provider
                .advisory_state(&machine.id, STOPPED_REASON, MachineState::Stopped)
                .await;
            Ok(IdleOutcome::Stopped)
        };

        run_exclusive(self.locker.as_ref(), &machine_id, task).await
    }
}
