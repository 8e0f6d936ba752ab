//! Actor implementations

pub mod machine;

pub use machine::{MachineActor, MachineActorArgs};
