//! DNS and alias store traits

use async_trait::async_trait;

use crate::error::DnsError;
use crate::types::Alias;

/// Domain name to IP address record store
#[async_trait]
pub trait DnsStore: Send + Sync {
    /// Check that `domain` is well formed and owned by `owner`
    async fn validate(&self, domain: &str, owner: &str) -> Result<(), DnsError>;

    /// Delete the record of `domain` pointing at `ip`
    async fn delete(&self, domain: &str, ip: &str) -> Result<(), DnsError>;

    /// Create or update the record of `domain` to point at `ip`
    async fn upsert(&self, domain: &str, ip: &str, owner: &str) -> Result<(), DnsError>;
}

/// Store of domain aliases and their machine association
#[async_trait]
pub trait DomainStorage: Send + Sync {
    /// All aliases bound to a machine
    async fn get_by_machine(&self, machine_id: &str) -> Result<Vec<Alias>, DnsError>;

    /// Bind `domain` to a machine, or unbind it with `None`
    async fn update_machine(&self, domain: &str, machine_id: Option<&str>) -> Result<(), DnsError>;
}
