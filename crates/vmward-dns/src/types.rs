//! Domain alias types

use serde::{Deserialize, Serialize};

/// Secondary hostname bound to a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// Fully qualified domain name
    pub name: String,
    /// Machine the alias points to, if any
    pub machine_id: Option<String>,
}

impl Alias {
    pub fn new(name: impl Into<String>, machine_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            machine_id: Some(machine_id.into()),
        }
    }
}

/// Outcome of synchronizing a batch of aliases
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Domains processed without error
    pub synced: Vec<String>,
    /// Domains where at least one step failed
    pub failed: Vec<String>,
}

impl SyncReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
