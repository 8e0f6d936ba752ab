//! `MachineActor`: Per-machine workflow dispatch
//!
//! One actor per machine id. The mailbox serializes workflows for the same
//! machine; every workflow additionally runs under the machine lock so it
//! excludes idle-triggered stops, and always starts from a fresh copy of the
//! machine record.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tokio::sync::broadcast;
use tracing::{error, info};

use vmward_api::{Artifact, ProgressEvent};

use crate::error::CoreError;
use crate::lock::run_exclusive;
use crate::machine::Machine;
use crate::message::{
    DestroyMachine, GetStatus, MachineStatus, ReinitMachine, RestartMachine, StartMachine,
    StopMachine,
};
use crate::provider::Provider;

/// Arguments for spawning a `MachineActor`
pub struct MachineActorArgs {
    pub machine_id: String,
    pub provider: Arc<Provider>,
    /// Progress events of every workflow go here
    pub event_tx: broadcast::Sender<ProgressEvent>,
}

/// Per-machine actor running lifecycle workflows one at a time
pub struct MachineActor {
    machine_id: String,
    provider: Arc<Provider>,
    event_tx: broadcast::Sender<ProgressEvent>,
    last_operation: Option<&'static str>,
    last_error: Option<String>,
    operations: u64,
    last_finished: Option<DateTime<Utc>>,
}

impl MachineActor {
    #[must_use]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Run `workflow` on a fresh copy of the machine while holding its lock
    ///
    /// The workflow runs on its own task, so a panic inside it fails only
    /// this call and the lock is still released.
    async fn run_locked<T, F, Fut>(
        &mut self,
        operation: &'static str,
        workflow: F,
    ) -> Result<T, CoreError>
    where
        T: Send + 'static,
        F: FnOnce(Machine) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CoreError>> + Send + 'static,
    {
        let store = self.provider.store().clone();
        let machine_id = self.machine_id.clone();
        let event_tx = self.event_tx.clone();
        let task = async move {
            match store.get(&machine_id).await {
                Ok(mut machine) => {
                    machine.events = Arc::new(event_tx);
                    workflow(machine).await
                }
                Err(e) => Err(e.into()),
            }
        };

        let result = run_exclusive(self.provider.locker().as_ref(), &self.machine_id, task).await;

        self.last_operation = Some(operation);
        self.operations += 1;
        self.last_finished = Some(Utc::now());
        match &result {
            Ok(_) => {
                self.last_error = None;
                info!(machine = %self.machine_id, operation, "workflow finished");
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                error!(machine = %self.machine_id, operation, error = %e, "workflow failed");
            }
        }

        result
    }
}

impl Actor for MachineActor {
    type Args = MachineActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(machine = %args.machine_id, id = %actor_ref.id(), "MachineActor starting");

        Ok(Self {
            machine_id: args.machine_id,
            provider: args.provider,
            event_tx: args.event_tx,
            last_operation: None,
            last_error: None,
            operations: 0,
            last_finished: None,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(
            machine = %self.machine_id,
            reason = ?reason,
            "MachineActor stopping"
        );
        Ok(())
    }
}

impl Message<StartMachine> for MachineActor {
    type Reply = Result<Artifact, CoreError>;

    async fn handle(
        &mut self,
        _msg: StartMachine,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let provider = self.provider.clone();
        self.run_locked("start", move |machine| async move { provider.start(&machine).await })
            .await
    }
}

impl Message<StopMachine> for MachineActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        _msg: StopMachine,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let provider = self.provider.clone();
        self.run_locked("stop", move |machine| async move { provider.stop(&machine).await })
            .await
    }
}

impl Message<RestartMachine> for MachineActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        _msg: RestartMachine,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let provider = self.provider.clone();
        self.run_locked("restart", move |machine| async move { provider.restart(&machine).await })
            .await
    }
}

impl Message<DestroyMachine> for MachineActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        _msg: DestroyMachine,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let provider = self.provider.clone();
        self.run_locked("destroy", move |machine| async move { provider.destroy(&machine).await })
            .await
    }
}

impl Message<ReinitMachine> for MachineActor {
    type Reply = Result<Artifact, CoreError>;

    async fn handle(
        &mut self,
        _msg: ReinitMachine,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let provider = self.provider.clone();
        self.run_locked("reinit", move |mut machine| async move {
            provider.reinit(&mut machine).await
        })
        .await
    }
}

impl Message<GetStatus> for MachineActor {
    type Reply = MachineStatus;

    async fn handle(
        &mut self,
        _msg: GetStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        MachineStatus {
            machine_id: self.machine_id.clone(),
            last_operation: self.last_operation,
            last_error: self.last_error.clone(),
            operations: self.operations,
            last_finished: self.last_finished,
        }
    }
}
