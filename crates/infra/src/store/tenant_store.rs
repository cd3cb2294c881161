use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use stockpilot_core::TenantId;

use super::StoreError;

/// Tenant-isolated key/value store, used for alerts and rules.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, StoreError>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> Result<(), StoreError>;
    fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, StoreError>;
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, StoreError> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> Result<(), StoreError> {
        (**self).upsert(tenant_id, key, value)
    }

    fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, StoreError> {
        (**self).list(tenant_id)
    }
}

/// In-memory tenant-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(&(tenant_id, key.clone())).cloned())
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        map.insert((tenant_id, key), value);
        Ok(())
    }

    fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map
            .iter()
            .filter_map(|((t, _k), v)| if *t == tenant_id { Some(v.clone()) } else { None })
            .collect())
    }
}
