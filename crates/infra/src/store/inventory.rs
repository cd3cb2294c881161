use std::collections::HashMap;
use std::sync::RwLock;

use stockpilot_core::{AggregateRoot, ExpectedVersion, TenantId};
use stockpilot_inventory::{InventoryItem, InventoryItemId};

use super::StoreError;

/// Current state of every inventory item, saved with an optimistic version check.
pub trait InventoryStore: Send + Sync {
    fn get(&self, tenant_id: TenantId, item_id: InventoryItemId) -> Result<Option<InventoryItem>, StoreError>;

    /// Persist `item` if the stored version still equals `expected`.
    ///
    /// A missing record has version 0.
    fn save(
        &self,
        tenant_id: TenantId,
        item: &InventoryItem,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// All items of a tenant, ordered by sku.
    fn list(&self, tenant_id: TenantId) -> Result<Vec<InventoryItem>, StoreError>;

    fn find_by_sku(&self, tenant_id: TenantId, sku: &str) -> Result<Option<InventoryItem>, StoreError> {
        Ok(self
            .list(tenant_id)?
            .into_iter()
            .find(|item| item.sku().eq_ignore_ascii_case(sku)))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    inner: RwLock<HashMap<(TenantId, InventoryItemId), InventoryItem>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn get(&self, tenant_id: TenantId, item_id: InventoryItemId) -> Result<Option<InventoryItem>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(&(tenant_id, item_id)).cloned())
    }

    fn save(
        &self,
        tenant_id: TenantId,
        item: &InventoryItem,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let key = (tenant_id, item.id_typed());
        let actual = map.get(&key).map_or(0, AggregateRoot::version);
        if !expected.matches(actual) {
            return Err(StoreError::VersionConflict { expected, actual });
        }
        map.insert(key, item.clone());
        Ok(())
    }

    fn list(&self, tenant_id: TenantId) -> Result<Vec<InventoryItem>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let mut items: Vec<_> = map
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|(_, item)| item.clone())
            .collect();
        items.sort_by(|a, b| a.sku().cmp(b.sku()));
        Ok(items)
    }
}
