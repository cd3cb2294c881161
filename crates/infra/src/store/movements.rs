use std::collections::HashMap;
use std::sync::RwLock;

use stockpilot_core::TenantId;
use stockpilot_inventory::{InventoryItemId, MovementId, StockMovement};

use super::StoreError;

/// Append-only movement ledger.
///
/// `update` exists only to record that a movement was reversed.
pub trait MovementStore: Send + Sync {
    fn append(&self, movement: StockMovement) -> Result<(), StoreError>;
    fn get(&self, tenant_id: TenantId, movement_id: MovementId) -> Result<Option<StockMovement>, StoreError>;
    fn update(&self, movement: &StockMovement) -> Result<(), StoreError>;
    /// Movements of one item in the order they were appended.
    fn list_for_item(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Vec<StockMovement>, StoreError>;
}

#[derive(Debug, Default)]
struct Ledger {
    entries: Vec<StockMovement>,
    index: HashMap<MovementId, usize>,
}

#[derive(Debug, Default)]
pub struct InMemoryMovementStore {
    inner: RwLock<Ledger>,
}

impl InMemoryMovementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MovementStore for InMemoryMovementStore {
    fn append(&self, movement: StockMovement) -> Result<(), StoreError> {
        let mut ledger = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        if ledger.index.contains_key(&movement.id()) {
            return Err(StoreError::AlreadyExists(format!("movement {}", movement.id())));
        }
        let position = ledger.entries.len();
        ledger.index.insert(movement.id(), position);
        ledger.entries.push(movement);
        Ok(())
    }

    fn get(&self, tenant_id: TenantId, movement_id: MovementId) -> Result<Option<StockMovement>, StoreError> {
        let ledger = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(ledger
            .index
            .get(&movement_id)
            .map(|&i| &ledger.entries[i])
            .filter(|m| m.tenant_id() == tenant_id)
            .cloned())
    }

    fn update(&self, movement: &StockMovement) -> Result<(), StoreError> {
        let mut ledger = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let Some(&position) = ledger.index.get(&movement.id()) else {
            return Err(StoreError::NotFound(format!("movement {}", movement.id())));
        };
        let stored = &mut ledger.entries[position];
        if stored.tenant_id() != movement.tenant_id() || stored.item_id() != movement.item_id() {
            return Err(StoreError::Storage("movement identity cannot change".to_string()));
        }
        *stored = movement.clone();
        Ok(())
    }

    fn list_for_item(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> Result<Vec<StockMovement>, StoreError> {
        let ledger = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(ledger
            .entries
            .iter()
            .filter(|m| m.tenant_id() == tenant_id && m.item_id() == item_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockpilot_events::execute;
    use stockpilot_inventory::{
        AdjustStock, InventoryCommand, InventoryItem, MovementType, RegisterItem, StockThresholds,
    };

    fn movements(tenant_id: TenantId) -> Vec<StockMovement> {
        let item_id = InventoryItemId::generate();
        let mut item = InventoryItem::empty(item_id);
        let mut out = Vec::new();
        let commands = [
            InventoryCommand::RegisterItem(RegisterItem {
                tenant_id,
                item_id,
                sku: "SKU".to_string(),
                name: "Widget".to_string(),
                category: None,
                supplier_id: None,
                price: None,
                unit_cost: None,
                thresholds: StockThresholds::default(),
                initial_stock: 10,
                initial_movement_id: MovementId::generate(),
                occurred_at: Utc::now(),
            }),
            InventoryCommand::AdjustStock(AdjustStock {
                tenant_id,
                item_id,
                movement_id: MovementId::generate(),
                delta: -3,
                movement_type: MovementType::Sale,
                reason: "sold".to_string(),
                unit_cost: None,
                reference: None,
                occurred_at: Utc::now(),
            }),
        ];
        for cmd in &commands {
            for ev in execute(&mut item, cmd).unwrap() {
                out.extend(ev.movement().cloned());
            }
        }
        out
    }

    #[test]
    fn append_preserves_order_and_rejects_duplicates() {
        let store = InMemoryMovementStore::new();
        let tenant = TenantId::new();
        let ms = movements(tenant);
        for m in &ms {
            store.append(m.clone()).unwrap();
        }
        assert!(matches!(
            store.append(ms[0].clone()),
            Err(StoreError::AlreadyExists(_))
        ));

        let listed = store.list_for_item(tenant, ms[0].item_id()).unwrap();
        assert_eq!(listed.iter().map(|m| m.quantity()).collect::<Vec<_>>(), vec![10, -3]);
        assert!(store.get(TenantId::new(), ms[0].id()).unwrap().is_none());
    }

    #[test]
    fn update_records_reversal_link() {
        let store = InMemoryMovementStore::new();
        let tenant = TenantId::new();
        let mut sale = movements(tenant).pop().unwrap();
        store.append(sale.clone()).unwrap();

        sale.mark_reversed(MovementId::generate()).unwrap();
        store.update(&sale).unwrap();
        assert!(store.get(tenant, sale.id()).unwrap().unwrap().is_reversed());
    }
}
