//! vmward-core: Machine lifecycle orchestration
//!
//! Implements the `Provider` workflows (start, stop, restart, destroy,
//! reinit), the capacity fallback policy, the idle monitor and the
//! `MachineActor`/`Fleet` dispatch layer built on kameo.

pub mod actor;
pub mod config;
pub mod error;
pub mod events;
pub mod fleet;
pub mod idle;
pub mod lock;
pub mod machine;
pub mod message;
pub mod provider;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod traits;

pub use actor::machine::{MachineActor, MachineActorArgs};
pub use config::{CapacityPolicy, IdlePolicy, KeyMaterial, ProviderConfig, Timings};
pub use error::CoreError;
pub use events::{EventSink, NoopSink};
pub use fleet::{DEFAULT_EVENT_CAPACITY, Fleet};
pub use idle::IdleOutcome;
pub use lock::{KeyedLocker, run_exclusive};
pub use machine::{BuilderConfig, Machine};
pub use message::{
    DestroyMachine, GetStatus, MachineStatus, ReinitMachine, RestartMachine, StartMachine,
    StopMachine,
};
pub use provider::{Provider, ProviderArgs};
pub use scheduler::Scheduler;
pub use session::{InstanceSession, PushRange};
pub use store::{
    MachineFields, MachineStore, MemoryMachineStore, StateChange, StorageUpdate, StoreError,
    StoredMachine, UpdateKind,
};
pub use traits::{AgentProbe, AllowAll, MachineLocker, PlanChecker, Rebuilder};
