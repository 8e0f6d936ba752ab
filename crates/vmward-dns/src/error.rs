//! Error types for vmward-dns

use thiserror::Error;

/// Errors that can occur during DNS and alias store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    /// Domain is malformed or not owned by the given user
    #[error("invalid domain {domain}: {reason}")]
    InvalidDomain {
        /// Offending domain
        domain: String,
        /// Why it was rejected
        reason: String,
    },

    /// No record exists for the domain
    #[error("no record for domain {0}")]
    RecordNotFound(String),

    /// The record points at a different address
    #[error("record for {domain} points to {actual}, not {expected}")]
    AddressMismatch {
        /// Domain name
        domain: String,
        /// Address the caller expected
        expected: String,
        /// Address the record holds
        actual: String,
    },

    /// The DNS provider rejected or failed the request
    #[error("DNS provider error: {0}")]
    ProviderError(String),

    /// The alias store failed
    #[error("domain storage error: {0}")]
    StorageError(String),
}

impl DnsError {
    /// Check if the error only means there was nothing to delete
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, DnsError::RecordNotFound(_))
    }
}
