//! Region-scoped client registry

use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::ComputeBackend;

/// Set of ready-to-use backend clients, one per region
#[derive(Clone, Default)]
pub struct ClientPool {
    clients: HashMap<String, Arc<dyn ComputeBackend>>,
}

impl std::fmt::Debug for ClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut regions: Vec<&String> = self.clients.keys().collect();
        regions.sort();
        f.debug_struct("ClientPool")
            .field("regions", &regions)
            .finish()
    }
}

impl ClientPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the client serving `region`
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>, client: Arc<dyn ComputeBackend>) -> Self {
        self.insert(region, client);
        self
    }

    pub fn insert(&mut self, region: impl Into<String>, client: Arc<dyn ComputeBackend>) {
        self.clients.insert(region.into(), client);
    }

    /// Client for `region`, if one is registered
    #[must_use]
    pub fn region(&self, region: &str) -> Option<Arc<dyn ComputeBackend>> {
        self.clients.get(region).cloned()
    }

    #[must_use]
    pub fn regions(&self) -> Vec<String> {
        let mut regions: Vec<String> = self.clients.keys().cloned().collect();
        regions.sort();
        regions
    }
}
