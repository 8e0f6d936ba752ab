//! In-memory DNS and alias stores
//!
//! `MemoryDns` serves a single hosted zone where every user owns the
//! subdomain `<user>.<zone>`.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::DnsError;
use crate::traits::{DnsStore, DomainStorage};
use crate::types::Alias;

/// A recorded DNS store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsCall {
    Validate { domain: String, owner: String },
    Delete { domain: String, ip: String },
    Upsert { domain: String, ip: String },
}

#[derive(Debug, Default)]
struct DnsInner {
    records: HashMap<String, String>,
    failing_upserts: HashSet<String>,
    failing_deletes: HashSet<String>,
    failing_validates: HashSet<String>,
    calls: Vec<DnsCall>,
}

/// In-memory record store for one hosted zone
#[derive(Debug)]
pub struct MemoryDns {
    zone: String,
    inner: Mutex<DnsInner>,
}

impl MemoryDns {
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            inner: Mutex::new(DnsInner::default()),
        }
    }

    #[must_use]
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Address a domain currently points at
    #[must_use]
    pub fn record(&self, domain: &str) -> Option<String> {
        self.inner.lock().records.get(domain).cloned()
    }

    pub fn set_record(&self, domain: impl Into<String>, ip: impl Into<String>) {
        self.inner.lock().records.insert(domain.into(), ip.into());
    }

    /// Make every upsert of `domain` fail
    pub fn fail_upserts_for(&self, domain: impl Into<String>) {
        self.inner.lock().failing_upserts.insert(domain.into());
    }

    /// Make every delete of `domain` fail
    pub fn fail_deletes_for(&self, domain: impl Into<String>) {
        self.inner.lock().failing_deletes.insert(domain.into());
    }

    /// Make every validation of `domain` fail
    pub fn fail_validates_for(&self, domain: impl Into<String>) {
        self.inner.lock().failing_validates.insert(domain.into());
    }

    /// All calls received so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<DnsCall> {
        self.inner.lock().calls.clone()
    }

    fn check_ownership(&self, domain: &str, owner: &str) -> Result<(), DnsError> {
        let invalid = |reason: &str| DnsError::InvalidDomain {
            domain: domain.to_string(),
            reason: reason.to_string(),
        };

        if domain.is_empty() {
            return Err(invalid("domain is empty"));
        }

        let labels_ok = domain.split('.').all(|label| {
            !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
        if !labels_ok {
            return Err(invalid("malformed label"));
        }

        let base = format!("{owner}.{}", self.zone);
        if domain != base && !domain.ends_with(&format!(".{base}")) {
            return Err(invalid(&format!("domain is not under {base}")));
        }

        Ok(())
    }
}

#[async_trait]
impl DnsStore for MemoryDns {
    async fn validate(&self, domain: &str, owner: &str) -> Result<(), DnsError> {
        {
            let mut inner = self.inner.lock();
            inner.calls.push(DnsCall::Validate {
                domain: domain.to_string(),
                owner: owner.to_string(),
            });
            if inner.failing_validates.contains(domain) {
                return Err(DnsError::ProviderError(format!(
                    "hosted zone unavailable for {domain}"
                )));
            }
        }
        self.check_ownership(domain, owner)
    }

    async fn delete(&self, domain: &str, ip: &str) -> Result<(), DnsError> {
        let mut inner = self.inner.lock();
        inner.calls.push(DnsCall::Delete {
            domain: domain.to_string(),
            ip: ip.to_string(),
        });
        if inner.failing_deletes.contains(domain) {
            return Err(DnsError::ProviderError(format!("delete of {domain} rejected")));
        }

        match inner.records.get(domain) {
            None => Err(DnsError::RecordNotFound(domain.to_string())),
            Some(actual) if actual != ip => Err(DnsError::AddressMismatch {
                domain: domain.to_string(),
                expected: ip.to_string(),
                actual: actual.clone(),
            }),
            Some(_) => {
                inner.records.remove(domain);
                debug!(domain, ip, "record deleted");
                Ok(())
            }
        }
    }

    async fn upsert(&self, domain: &str, ip: &str, _owner: &str) -> Result<(), DnsError> {
        let mut inner = self.inner.lock();
        inner.calls.push(DnsCall::Upsert {
            domain: domain.to_string(),
            ip: ip.to_string(),
        });
        if inner.failing_upserts.contains(domain) {
            return Err(DnsError::ProviderError(format!("upsert of {domain} rejected")));
        }

        inner.records.insert(domain.to_string(), ip.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StorageInner {
    aliases: BTreeMap<String, Alias>,
    fail_lookups: bool,
    fail_updates: bool,
    lookups: usize,
}

/// In-memory alias store
#[derive(Debug, Default)]
pub struct MemoryDomainStorage {
    inner: Mutex<StorageInner>,
}

impl MemoryDomainStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, alias: Alias) {
        self.inner.lock().aliases.insert(alias.name.clone(), alias);
    }

    /// Machine binding of an alias; `None` when the alias is unknown
    #[must_use]
    pub fn machine_of(&self, domain: &str) -> Option<Option<String>> {
        self.inner
            .lock()
            .aliases
            .get(domain)
            .map(|a| a.machine_id.clone())
    }

    /// Number of `get_by_machine` calls received
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.inner.lock().lookups
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.inner.lock().fail_lookups = fail;
    }

    pub fn fail_updates(&self, fail: bool) {
        self.inner.lock().fail_updates = fail;
    }
}

#[async_trait]
impl DomainStorage for MemoryDomainStorage {
    async fn get_by_machine(&self, machine_id: &str) -> Result<Vec<Alias>, DnsError> {
        let mut inner = self.inner.lock();
        inner.lookups += 1;
        if inner.fail_lookups {
            return Err(DnsError::StorageError("alias lookup failed".to_string()));
        }

        Ok(inner
            .aliases
            .values()
            .filter(|a| a.machine_id.as_deref() == Some(machine_id))
            .cloned()
            .collect())
    }

    async fn update_machine(&self, domain: &str, machine_id: Option<&str>) -> Result<(), DnsError> {
        let mut inner = self.inner.lock();
        if inner.fail_updates {
            return Err(DnsError::StorageError(format!("update of {domain} failed")));
        }

        let alias = inner
            .aliases
            .get_mut(domain)
            .ok_or_else(|| DnsError::StorageError(format!("unknown alias {domain}")))?;
        alias.machine_id = machine_id.map(str::to_string);
        Ok(())
    }
}
