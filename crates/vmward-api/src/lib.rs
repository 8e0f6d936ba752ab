//! vmward-api: Shared value types
//!
//! Machine states, provisioning artifacts and progress events used by the
//! backend, DNS and core crates.

pub mod artifact;
pub mod events;
pub mod state;

pub use artifact::Artifact;
pub use events::ProgressEvent;
pub use state::MachineState;
