//! vmward-dns: Hostname synchronization
//!
//! Provides the DNS record store and alias store traits, the domain
//! synchronizer that tolerates per-record failures, and in-memory stores.

pub mod error;
pub mod memory;
pub mod sync;
pub mod traits;
pub mod types;

pub use error::DnsError;
pub use memory::{DnsCall, MemoryDns, MemoryDomainStorage};
pub use sync::DomainSync;
pub use traits::{DnsStore, DomainStorage};
pub use types::{Alias, SyncReport};
