//! vmward-backend: Compute backend abstraction
//!
//! Provides the instance-control trait, structured backend errors, the
//! region-scoped client pool and an in-memory backend.

pub mod error;
pub mod info;
pub mod memory;
pub mod pool;
pub mod traits;

pub use error::{BackendError, BackendErrorKind};
pub use info::InstanceInfo;
pub use memory::{BackendCall, MemoryBackend, MemoryInstance, Operation};
pub use pool::ClientPool;
pub use traits::ComputeBackend;
