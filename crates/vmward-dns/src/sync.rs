//! Domain synchronizer
//!
//! Points a machine's hostnames at its current address, or removes them.
//! Alias batches never stop at the first failure: every alias is attempted
//! and failures are logged with the machine id.

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::DnsError;
use crate::traits::{DnsStore, DomainStorage};
use crate::types::{Alias, SyncReport};

/// Keeps DNS records and alias bindings in line with instance state
#[derive(Clone)]
pub struct DomainSync {
    dns: Arc<dyn DnsStore>,
    storage: Arc<dyn DomainStorage>,
}

impl DomainSync {
    pub fn new(dns: Arc<dyn DnsStore>, storage: Arc<dyn DomainStorage>) -> Self {
        Self { dns, storage }
    }

    pub async fn validate(&self, domain: &str, owner: &str) -> Result<(), DnsError> {
        self.dns.validate(domain, owner).await
    }

    /// Validate `domain` for `owner` and point it at `ip`
    pub async fn upsert(&self, domain: &str, ip: &str, owner: &str) -> Result<(), DnsError> {
        self.dns.validate(domain, owner).await?;
        self.dns.upsert(domain, ip, owner).await?;
        debug!(domain, ip, "domain updated");
        Ok(())
    }

    pub async fn delete(&self, domain: &str, ip: &str) -> Result<(), DnsError> {
        self.dns.delete(domain, ip).await
    }

    /// Aliases bound to a machine; a failed lookup is logged and yields none
    pub async fn aliases(&self, machine_id: &str) -> Vec<Alias> {
        match self.storage.get_by_machine(machine_id).await {
            Ok(aliases) => aliases,
            Err(e) => {
                error!(machine = %machine_id, error = %e, "fetching domain aliases failed");
                Vec::new()
            }
        }
    }

    /// Point every alias at `ip`
    pub async fn upsert_aliases(
        &self,
        machine_id: &str,
        aliases: &[Alias],
        ip: &str,
        owner: &str,
    ) -> SyncReport {
        let mut report = SyncReport::default();

        for alias in aliases {
            match self.upsert(&alias.name, ip, owner).await {
                Ok(()) => report.synced.push(alias.name.clone()),
                Err(e) => {
                    error!(machine = %machine_id, domain = %alias.name, error = %e, "couldn't update domain");
                    report.failed.push(alias.name.clone());
                }
            }
        }

        report
    }

    /// Delete every alias record for `ip`
    ///
    /// With `detach` set, each alias is also unbound from the machine in the
    /// alias store, whether or not its record deletion succeeded.
    pub async fn delete_aliases(
        &self,
        machine_id: &str,
        aliases: &[Alias],
        ip: &str,
        detach: bool,
    ) -> SyncReport {
        let mut report = SyncReport::default();

        for alias in aliases {
            let mut ok = true;

            if let Err(e) = self.dns.delete(&alias.name, ip).await {
                error!(machine = %machine_id, domain = %alias.name, error = %e, "couldn't delete domain");
                ok = false;
            }

            if detach
                && let Err(e) = self.storage.update_machine(&alias.name, None).await
            {
                error!(machine = %machine_id, domain = %alias.name, error = %e, "couldn't unset machine domain");
                ok = false;
            }

            if ok {
                report.synced.push(alias.name.clone());
            } else {
                report.failed.push(alias.name.clone());
            }
        }

        report
    }
}
