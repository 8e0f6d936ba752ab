//! Lifecycle provider
//!
//! Drives start, stop, restart, destroy and reinit against the compute
//! backend and keeps DNS records, alias bindings and the idle monitor in line
//! with the resulting instance state. DNS and alias failures are logged and
//! never undo a backend transition; the one exception is the domain
//! validation at the start of the stop workflow's DNS phase.

use std::sync::Arc;

use tracing::{debug, error, warn};
use vmward_api::{Artifact, MachineState};
use vmward_backend::ClientPool;
use vmward_dns::{DnsError, DomainSync, SyncReport};

use crate::config::ProviderConfig;
use crate::error::CoreError;
use crate::machine::Machine;
use crate::scheduler::Scheduler;
use crate::session::{InstanceSession, PushRange};
use crate::store::{MachineStore, StorageUpdate};
use crate::traits::{AgentProbe, MachineLocker, PlanChecker, Rebuilder};

/// Collaborators of a [`Provider`]
pub struct ProviderArgs {
    pub config: ProviderConfig,
    /// Region-scoped compute clients
    pub clients: ClientPool,
    pub store: Arc<dyn MachineStore>,
    pub domains: DomainSync,
    pub plan: Arc<dyn PlanChecker>,
    pub agent: Arc<dyn AgentProbe>,
    pub rebuilder: Arc<dyn Rebuilder>,
    pub locker: Arc<dyn MachineLocker>,
    /// Idle timer registry
    pub scheduler: Scheduler,
}

/// Machine lifecycle provider
pub struct Provider {
    pub(crate) config: ProviderConfig,
    pub(crate) clients: ClientPool,
    pub(crate) store: Arc<dyn MachineStore>,
    pub(crate) domains: DomainSync,
    pub(crate) plan: Arc<dyn PlanChecker>,
    pub(crate) agent: Arc<dyn AgentProbe>,
    pub(crate) rebuilder: Arc<dyn Rebuilder>,
    pub(crate) locker: Arc<dyn MachineLocker>,
    pub(crate) scheduler: Scheduler,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("config", &self.config)
            .field("clients", &self.clients)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl Provider {
    #[must_use]
    pub fn new(args: ProviderArgs) -> Arc<Self> {
        Arc::new(Self {
            config: args.config,
            clients: args.clients,
            store: args.store,
            domains: args.domains,
            plan: args.plan,
            agent: args.agent,
            rebuilder: args.rebuilder,
            locker: args.locker,
            scheduler: args.scheduler,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn MachineStore> {
        &self.store
    }

    #[must_use]
    pub fn locker(&self) -> &Arc<dyn MachineLocker> {
        &self.locker
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Open an instance session for `machine`
    ///
    /// # Errors
    /// See [`InstanceSession::open`]
    pub fn open_session(&self, machine: &Machine) -> Result<InstanceSession, CoreError> {
        InstanceSession::open(machine, &self.clients, &self.config)
    }

    /// Bring a machine's instance up and point its hostnames at it
    ///
    /// # Errors
    /// `AuthorizationDenied` when the plan check refuses, `BackendQueryError`
    /// when the instance can't be described, `BackendMutationError` or
    /// `NoCapacityAvailable` when it can't be started.
    pub async fn start(self: &Arc<Self>, machine: &Machine) -> Result<Artifact, CoreError> {
        self.plan
            .always_on(machine)
            .await
            .map_err(CoreError::AuthorizationDenied)?;

        let session = self.open_session(machine)?;
        let info = session.info().await?;

        let mut artifact = Artifact {
            ip_address: info
                .ip_address
                .clone()
                .unwrap_or_else(|| machine.ip_address.clone()),
            instance_id: session.builder().instance_id.clone(),
            domain_name: String::new(),
            instance_type: info.instance_type.clone(),
        };

        self.stop_timer(machine);

        session.push("Starting machine", 10, MachineState::Starting);

        let configured_type = session.builder().instance_type.clone();
        if !configured_type.is_empty() && info.instance_type != configured_type {
            warn!(
                machine = %machine.id,
                current = %info.instance_type,
                configured = %configured_type,
                "instance type drifted, changing it back"
            );
            match session.resize(&configured_type).await {
                Ok(()) => artifact.instance_type.clone_from(&configured_type),
                Err(e) => warn!(
                    machine = %machine.id,
                    instance_type = %configured_type,
                    error = %e,
                    "couldn't change instance type back"
                ),
            }
            tokio::time::sleep(self.config.timings.resize_settle()).await;
        }

        if info.state.is_in(&[MachineState::Stopped, MachineState::Stopping]) {
            if info.state == MachineState::Stopping {
                tokio::time::sleep(self.config.timings.stopping_grace()).await;
            }

            let started = self.start_with_fallback(&session).await?;
            artifact.ip_address = started.ip_address;
            artifact.instance_type = started.instance_type;
            if !started.instance_id.is_empty() {
                artifact.instance_id = started.instance_id;
            }
        }

        self.advisory_update(
            &machine.id,
            StorageUpdate::starting(&artifact.ip_address, &artifact.instance_type),
        )
        .await;

        session.push("Initializing domain instance", 65, MachineState::Starting);
        if let Err(e) = self
            .domains
            .upsert(&machine.domain, &artifact.ip_address, &machine.username)
            .await
        {
            error!(machine = %machine.id, domain = %machine.domain, error = %e, "updating domain for start failed");
        }

        session.push("Updating domain aliases", 80, MachineState::Starting);
        let aliases = self.domains.aliases(&machine.id).await;
        let report = self
            .domains
            .upsert_aliases(&machine.id, &aliases, &artifact.ip_address, &machine.username)
            .await;
        log_alias_report(&machine.id, "upsert", &report);

        artifact.domain_name.clone_from(&machine.domain);

        session.push("Checking remote machine", 90, MachineState::Starting);
        if self.agent.is_reachable(&machine.query_string).await {
            debug!(machine = %machine.id, "remote agent is ready");
        } else {
            warn!(machine = %machine.id, "remote agent is not ready, couldn't connect to it");
            if self.config.idle.arm_after_start {
                self.start_timer(machine);
            }
        }

        Ok(artifact)
    }

    /// Start the instance, walking the fallback types on capacity errors
    async fn start_with_fallback(&self, session: &InstanceSession) -> Result<Artifact, CoreError> {
        let err = match session.start(true).await {
            Ok(artifact) => return Ok(artifact),
            Err(e) if !e.is_capacity() => return Err(CoreError::BackendMutationError(e)),
            Err(e) => e,
        };

        let machine_id = session.machine_id();
        error!(machine = %machine_id, error = %err, "no capacity for configured instance type");

        let mut tried = Vec::new();
        for instance_type in &self.config.capacity.fallback_instance_types {
            warn!(
                machine = %machine_id,
                instance_type = %instance_type,
                "fallback: starting again with another instance type"
            );
            tried.push(instance_type.clone());

            session
                .resize(instance_type)
                .await
                .map_err(CoreError::BackendMutationError)?;
            tokio::time::sleep(self.config.timings.resize_settle()).await;

            match session.start(true).await {
                Ok(artifact) => return Ok(artifact),
                Err(e) => warn!(
                    machine = %machine_id,
                    instance_type = %instance_type,
                    retryable = e.is_retryable(),
                    error = %e,
                    "fallback: couldn't start instance"
                ),
            }
        }

        Err(CoreError::NoCapacityAvailable { tried })
    }

    /// Stop a machine's instance and remove its hostnames
    ///
    /// # Errors
    /// `BackendMutationError` when the stop fails, `DnsError` when the primary
    /// domain fails validation.
    pub async fn stop(&self, machine: &Machine) -> Result<(), CoreError> {
        let session = self.open_session(machine)?;

        self.stop_timer(machine);

        session
            .stop()
            .await
            .map_err(CoreError::BackendMutationError)?;

        session.push("Initializing domain instance", 65, MachineState::Stopping);
        self.domains
            .validate(&machine.domain, &machine.username)
            .await?;

        session.push("Deleting domain", 85, MachineState::Stopping);
        match self
            .domains
            .delete(&machine.domain, &machine.ip_address)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_missing() => log_missing_record(&machine.id, &e),
            Err(e) => {
                warn!(machine = %machine.id, domain = %machine.domain, error = %e, "couldn't delete domain");
            }
        }

        let aliases = self.domains.aliases(&machine.id).await;
        let report = self
            .domains
            .delete_aliases(&machine.id, &aliases, &machine.ip_address, false)
            .await;
        log_alias_report(&machine.id, "delete", &report);

        Ok(())
    }

    /// Hard restart a machine's instance
    ///
    /// # Errors
    /// Returns `BackendMutationError` if the restart fails
    pub async fn restart(&self, machine: &Machine) -> Result<(), CoreError> {
        let session = self.open_session(machine)?;
        session
            .restart()
            .await
            .map_err(CoreError::BackendMutationError)
    }

    /// Terminate a machine's instance and release all its hostnames
    ///
    /// # Errors
    /// Returns `BackendMutationError` if the terminate fails
    pub async fn destroy(&self, machine: &Machine) -> Result<(), CoreError> {
        let session = self.open_session(machine)?;
        self.destroy_instance(&session, machine, PushRange::new(10, 80))
            .await?;

        let aliases = self.domains.aliases(&machine.id).await;

        session.push("Deleting base domain", 85, MachineState::Terminating);
        match self
            .domains
            .delete(&machine.domain, &machine.ip_address)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_missing() => log_missing_record(&machine.id, &e),
            Err(e) => {
                error!(machine = %machine.id, domain = %machine.domain, error = %e, "deleting domain during destroy failed");
            }
        }

        session.push("Deleting custom domain", 90, MachineState::Terminating);
        let report = self
            .domains
            .delete_aliases(&machine.id, &aliases, &machine.ip_address, true)
            .await;
        log_alias_report(&machine.id, "detach", &report);

        Ok(())
    }

    /// Terminate the instance, keeping the last fifth of `range` for the caller
    async fn destroy_instance(
        &self,
        session: &InstanceSession,
        machine: &Machine,
        range: PushRange,
    ) -> Result<(), CoreError> {
        self.stop_timer(machine);
        session
            .terminate(range.reserve_tail())
            .await
            .map_err(CoreError::BackendMutationError)
    }

    /// Replace a machine's instance with a freshly built one
    ///
    /// The machine is modified in place: its query string and IP address are
    /// cleared before the rebuild runs.
    ///
    /// # Errors
    /// Returns `BackendMutationError` if the old instance can't be
    /// terminated, otherwise whatever the rebuild returns.
    pub async fn reinit(&self, machine: &mut Machine) -> Result<Artifact, CoreError> {
        let mut session = self.open_session(machine)?;
        self.destroy_instance(&session, machine, PushRange::new(10, 40))
            .await?;

        self.advisory_update(&machine.id, StorageUpdate::building_reset())
            .await;
        self.advisory_state(&machine.id, "Reinit cleanup", MachineState::NotInitialized)
            .await;

        session.builder_mut().instance_id.clear();
        machine.query_string.clear();
        machine.ip_address.clear();

        self.rebuilder
            .run(&mut session, machine, PushRange::new(40, 90))
            .await
    }

    pub(crate) async fn advisory_update(&self, machine_id: &str, update: StorageUpdate) {
        let kind = update.kind;
        if let Err(e) = self.store.update(machine_id, update).await {
            warn!(machine = %machine_id, kind = kind.as_str(), error = %e, "couldn't write machine data");
        }
    }

    pub(crate) async fn advisory_state(&self, machine_id: &str, reason: &str, state: MachineState) {
        if let Err(e) = self.store.update_state(machine_id, reason, state).await {
            warn!(machine = %machine_id, state = %state, error = %e, "couldn't write machine state");
        }
    }
}

fn log_missing_record(machine_id: &str, err: &DnsError) {
    debug!(machine = %machine_id, error = %err, "domain record already gone");
}

fn log_alias_report(machine_id: &str, action: &'static str, report: &SyncReport) {
    if report.is_clean() {
        debug!(machine = %machine_id, action, synced = report.synced.len(), "domain aliases synced");
    } else {
        warn!(
            machine = %machine_id,
            action,
            synced = report.synced.len(),
            failed = ?report.failed,
            "some domain aliases were not synced"
        );
    }
}
