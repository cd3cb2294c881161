//! Storage boundaries for items, movements, alerts and rules.
//!
//! Every store is tenant-isolated. The in-memory implementations back tests and the
//! worker binary; durable adapters implement the same traits.

pub mod inventory;
pub mod movements;
pub mod tenant_store;

use stockpilot_core::{DomainError, ExpectedVersion};

pub use inventory::{InMemoryInventoryStore, InventoryStore};
pub use movements::{InMemoryMovementStore, MovementStore};
pub use tenant_store::{InMemoryTenantStore, TenantStore};

/// Store adapter error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    Poisoned,
    #[error("version conflict (expected: {expected:?}, actual: {actual})")]
    VersionConflict {
        expected: ExpectedVersion,
        actual: u64,
    },
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } | StoreError::AlreadyExists(_) => {
                DomainError::conflict(err.to_string())
            }
            StoreError::NotFound(what) => DomainError::not_found(what),
            StoreError::Poisoned | StoreError::Storage(_) => DomainError::execution(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_the_domain_taxonomy() {
        let conflict: DomainError = StoreError::VersionConflict {
            expected: ExpectedVersion::Exact(2),
            actual: 3,
        }
        .into();
        assert!(conflict.is_conflict());

        let missing: DomainError = StoreError::NotFound("movement 42".to_string()).into();
        assert!(missing.is_not_found());

        let poisoned: DomainError = StoreError::Poisoned.into();
        assert!(matches!(poisoned, DomainError::Execution(_)));
    }
}
