//! Fleet: registry of machine actors
//!
//! Spawns a [`MachineActor`] per machine id on first use. Workflows for the
//! same machine queue in its mailbox; distinct machines run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use kameo::actor::{ActorRef, Spawn};
use kameo::error::SendError;
use tokio::sync::{Mutex, broadcast};
use tracing::info;

use vmward_api::{Artifact, ProgressEvent};

use crate::actor::{MachineActor, MachineActorArgs};
use crate::error::CoreError;
use crate::message::{
    DestroyMachine, GetStatus, MachineStatus, ReinitMachine, RestartMachine, StartMachine,
    StopMachine,
};
use crate::provider::Provider;

/// Default capacity of the progress event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Entry point for running lifecycle workflows by machine id
pub struct Fleet {
    provider: Arc<Provider>,
    event_tx: broadcast::Sender<ProgressEvent>,
    machines: Mutex<HashMap<String, ActorRef<MachineActor>>>,
}

fn reply_error<M>(err: SendError<M, CoreError>) -> CoreError {
    match err {
        SendError::HandlerError(e) => e,
        other => CoreError::ActorError(other.to_string()),
    }
}

impl Fleet {
    #[must_use]
    pub fn new(provider: Arc<Provider>, event_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity);
        Self {
            provider,
            event_tx,
            machines: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    /// Receive progress events of every workflow run through this fleet
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.event_tx.subscribe()
    }

    /// Get the actor for a machine, spawning it if needed
    async fn actor(&self, machine_id: &str) -> ActorRef<MachineActor> {
        let mut machines = self.machines.lock().await;
        if let Some(actor_ref) = machines.get(machine_id)
            && actor_ref.is_alive()
        {
            return actor_ref.clone();
        }

        let actor_ref = MachineActor::spawn(MachineActorArgs {
            machine_id: machine_id.to_string(),
            provider: self.provider.clone(),
            event_tx: self.event_tx.clone(),
        });
        info!(machine = %machine_id, "spawned MachineActor");

        machines.insert(machine_id.to_string(), actor_ref.clone());
        actor_ref
    }

    /// # Errors
    /// Returns the start workflow's error
    pub async fn start(&self, machine_id: &str) -> Result<Artifact, CoreError> {
        let actor_ref = self.actor(machine_id).await;
        actor_ref.ask(StartMachine).await.map_err(reply_error)
    }

    /// # Errors
    /// Returns the stop workflow's error
    pub async fn stop(&self, machine_id: &str) -> Result<(), CoreError> {
        let actor_ref = self.actor(machine_id).await;
        actor_ref.ask(StopMachine).await.map_err(reply_error)
    }

    /// # Errors
    /// Returns the restart workflow's error
    pub async fn restart(&self, machine_id: &str) -> Result<(), CoreError> {
        let actor_ref = self.actor(machine_id).await;
        actor_ref.ask(RestartMachine).await.map_err(reply_error)
    }

    /// # Errors
    /// Returns the destroy workflow's error
    pub async fn destroy(&self, machine_id: &str) -> Result<(), CoreError> {
        let actor_ref = self.actor(machine_id).await;
        actor_ref.ask(DestroyMachine).await.map_err(reply_error)
    }

    /// # Errors
    /// Returns the reinit workflow's error
    pub async fn reinit(&self, machine_id: &str) -> Result<Artifact, CoreError> {
        let actor_ref = self.actor(machine_id).await;
        actor_ref.ask(ReinitMachine).await.map_err(reply_error)
    }

    /// Bookkeeping of a machine's actor, if one is running
    ///
    /// # Errors
    /// Returns `ActorError` if the actor can't be reached
    pub async fn status(&self, machine_id: &str) -> Result<Option<MachineStatus>, CoreError> {
        let actor_ref = self.machines.lock().await.get(machine_id).cloned();
        match actor_ref {
            Some(actor_ref) => actor_ref
                .ask(GetStatus)
                .await
                .map(Some)
                .map_err(|e| CoreError::ActorError(e.to_string())),
            None => Ok(None),
        }
    }

    /// Stop and drop a machine's actor; returns whether one was registered
    pub async fn forget(&self, machine_id: &str) -> bool {
        let actor_ref = self.machines.lock().await.remove(machine_id);
        match actor_ref {
            Some(actor_ref) => {
                actor_ref.stop_gracefully().await.ok();
                info!(machine = %machine_id, "forgot MachineActor");
                true
            }
            None => false,
        }
    }

    /// Number of registered machine actors
    pub async fn len(&self) -> usize {
        self.machines.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop every actor and cancel every idle timer
    pub async fn shutdown(&self) {
        let actors: Vec<_> = self.machines.lock().await.drain().collect();
        for (machine_id, actor_ref) in actors {
            actor_ref.stop_gracefully().await.ok();
            info!(machine = %machine_id, "stopped MachineActor");
        }
        self.provider.scheduler().cancel_all();
    }
}
