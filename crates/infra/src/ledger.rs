//! Stock ledger: the only writer of stock numbers.
//!
//! Each mutation loads the item, runs the aggregate command, saves the item with an
//! optimistic version check and appends the resulting movements. A version conflict
//! reloads and retries a bounded number of times. Threshold alerts are re-evaluated
//! after every successful change; alert failures are logged and never undo a
//! committed movement.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use stockpilot_alerts::StockAlert;
use stockpilot_core::{AggregateRoot, Clock, DomainError, DomainResult, ExpectedVersion, TenantId};
use stockpilot_events::execute;
use stockpilot_inventory::{
    AdjustStock, DeactivateItem, InventoryCommand, InventoryEvent, InventoryItem, InventoryItemId,
    MovementId, MovementType, RegisterItem, ReleaseStock, ReserveStock, ReverseMovement, SetPrice,
    SetStockLevel, StockMovement, StockThresholds, UpdateThresholds,
};

use crate::alert_engine::{AlertEngine, SYSTEM_ACTOR};
use crate::store::{InventoryStore, MovementStore};

/// Catalog data for a new item.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub supplier_id: Option<String>,
    pub price: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
    pub thresholds: StockThresholds,
    pub initial_stock: i64,
}

/// A signed stock change with its cause.
#[derive(Debug, Clone, PartialEq)]
pub struct StockAdjustment {
    pub delta: i64,
    pub movement_type: MovementType,
    pub reason: String,
    pub unit_cost: Option<Decimal>,
    pub reference: Option<String>,
}

/// Result of a ledger write.
#[derive(Debug, Clone)]
pub struct LedgerUpdate {
    pub item: InventoryItem,
    /// `None` when the command changed no stock numbers.
    pub movement: Option<StockMovement>,
    /// Threshold alerts raised or merged by this change.
    pub alerts: Vec<StockAlert>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkStockUpdate {
    pub item_id: InventoryItemId,
    pub new_level: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub item_id: InventoryItemId,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
    pub successful: Vec<LedgerUpdate>,
    pub failed: Vec<BulkFailure>,
}

pub struct StockLedger {
    items: Arc<dyn InventoryStore>,
    movements: Arc<dyn MovementStore>,
    alerts: Arc<AlertEngine>,
    clock: Arc<dyn Clock>,
    conflict_retries: u32,
}

impl StockLedger {
    pub fn new(
        items: Arc<dyn InventoryStore>,
        movements: Arc<dyn MovementStore>,
        alerts: Arc<AlertEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            items,
            movements,
            alerts,
            clock,
            conflict_retries: 3,
        }
    }

    /// Retries after an optimistic concurrency conflict before giving up.
    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub fn register_item(&self, tenant_id: TenantId, new: NewItem) -> DomainResult<LedgerUpdate> {
        if self.items.find_by_sku(tenant_id, &new.sku)?.is_some() {
            return Err(DomainError::conflict(format!("sku {} already exists", new.sku)));
        }

        let item_id = InventoryItemId::generate();
        let mut item = InventoryItem::empty(item_id);
        let events = execute(
            &mut item,
            &InventoryCommand::RegisterItem(RegisterItem {
                tenant_id,
                item_id,
                sku: new.sku,
                name: new.name,
                category: new.category,
                supplier_id: new.supplier_id,
                price: new.price,
                unit_cost: new.unit_cost,
                thresholds: new.thresholds,
                initial_stock: new.initial_stock,
                initial_movement_id: MovementId::generate(),
                occurred_at: self.clock.now(),
            }),
        )?;
        self.items.save(tenant_id, &item, ExpectedVersion::Exact(0))?;
        let movement = self.append_movements(&events)?;

        info!(tenant = %tenant_id, item_id = %item_id, sku = %item.sku(), "inventory item registered");
        let alerts = self.refresh_alerts(&item);
        Ok(LedgerUpdate {
            item,
            movement,
            alerts,
        })
    }

    /// Set the absolute stock level (recorded as an adjustment).
    pub fn update_stock_level(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        new_level: i64,
        reason: &str,
    ) -> DomainResult<LedgerUpdate> {
        self.set_stock_level(tenant_id, item_id, new_level, MovementType::Adjustment, reason)
    }

    pub fn set_stock_level(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        new_level: i64,
        movement_type: MovementType,
        reason: &str,
    ) -> DomainResult<LedgerUpdate> {
        let movement_id = MovementId::generate();
        self.mutate(tenant_id, item_id, |_, now| {
            Ok(Some(InventoryCommand::SetStockLevel(SetStockLevel {
                tenant_id,
                item_id,
                movement_id,
                new_level,
                movement_type,
                reason: reason.to_string(),
                unit_cost: None,
                reference: None,
                occurred_at: now,
            })))
        })
    }

    pub fn adjust_stock(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        adjustment: StockAdjustment,
    ) -> DomainResult<LedgerUpdate> {
        let movement_id = MovementId::generate();
        self.mutate(tenant_id, item_id, |_, now| {
            Ok(Some(InventoryCommand::AdjustStock(AdjustStock {
                tenant_id,
                item_id,
                movement_id,
                delta: adjustment.delta,
                movement_type: adjustment.movement_type,
                reason: adjustment.reason.clone(),
                unit_cost: adjustment.unit_cost,
                reference: adjustment.reference.clone(),
                occurred_at: now,
            })))
        })
    }

    /// All-or-nothing reservation. Returns `false`, without touching the item, when
    /// available stock cannot cover `quantity`.
    pub fn reserve_stock(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        quantity: i64,
        reference: Option<String>,
    ) -> DomainResult<bool> {
        let movement_id = MovementId::generate();
        self.mutate(tenant_id, item_id, |item, now| {
            if quantity > 0 && !item.can_reserve(quantity) {
                return Ok(None);
            }
            Ok(Some(InventoryCommand::ReserveStock(ReserveStock {
                tenant_id,
                item_id,
                movement_id,
                quantity,
                reference: reference.clone(),
                occurred_at: now,
            })))
        })
        .map(|update| update.movement.is_some())
    }

    /// Release up to `quantity` reserved units.
    pub fn release_stock(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        quantity: i64,
        reference: Option<String>,
    ) -> DomainResult<LedgerUpdate> {
        let movement_id = MovementId::generate();
        self.mutate(tenant_id, item_id, |_, now| {
            Ok(Some(InventoryCommand::ReleaseStock(ReleaseStock {
                tenant_id,
                item_id,
                movement_id,
                quantity,
                reference: reference.clone(),
                occurred_at: now,
            })))
        })
    }

    /// Record the inverse of a movement and link the two.
    pub fn reverse_movement(
        &self,
        tenant_id: TenantId,
        movement_id: MovementId,
        reason: &str,
    ) -> DomainResult<LedgerUpdate> {
        let original = self.load_movement(tenant_id, movement_id)?;
        original.ensure_reversible()?;

        let reversal_id = MovementId::generate();
        let update = self.mutate(tenant_id, original.item_id(), |_, now| {
            // Re-read so a concurrent reversal is caught on retry.
            let original = self.load_movement(tenant_id, movement_id)?;
            original.ensure_reversible()?;
            Ok(Some(InventoryCommand::ReverseMovement(ReverseMovement {
                tenant_id,
                item_id: original.item_id(),
                movement_id: reversal_id,
                original,
                reason: reason.to_string(),
                occurred_at: now,
            })))
        })?;

        let mut original = self.load_movement(tenant_id, movement_id)?;
        original.mark_reversed(reversal_id)?;
        self.movements.update(&original)?;
        info!(
            tenant = %tenant_id,
            movement_id = %movement_id,
            reversal_id = %reversal_id,
            "movement reversed"
        );
        Ok(update)
    }

    /// Apply absolute levels one item at a time. Failures are collected, not raised.
    pub fn bulk_update(&self, tenant_id: TenantId, updates: Vec<BulkStockUpdate>) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for update in updates {
            match self.update_stock_level(tenant_id, update.item_id, update.new_level, &update.reason) {
                Ok(done) => outcome.successful.push(done),
                Err(e) => {
                    warn!(tenant = %tenant_id, item_id = %update.item_id, error = %e, "bulk stock update failed");
                    outcome.failed.push(BulkFailure {
                        item_id: update.item_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// Change the selling price. No movement is recorded.
    pub fn set_price(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        price: Decimal,
    ) -> DomainResult<InventoryItem> {
        self.mutate(tenant_id, item_id, |_, now| {
            Ok(Some(InventoryCommand::SetPrice(SetPrice {
                tenant_id,
                item_id,
                price,
                occurred_at: now,
            })))
        })
        .map(|update| update.item)
    }

    pub fn update_thresholds(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        thresholds: StockThresholds,
    ) -> DomainResult<LedgerUpdate> {
        self.mutate(tenant_id, item_id, |_, now| {
            Ok(Some(InventoryCommand::UpdateThresholds(UpdateThresholds {
                tenant_id,
                item_id,
                thresholds,
                occurred_at: now,
            })))
        })
    }

    /// Deactivate an item and close its open alerts.
    pub fn deactivate_item(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        reason: &str,
    ) -> DomainResult<InventoryItem> {
        let update = self.mutate(tenant_id, item_id, |_, now| {
            Ok(Some(InventoryCommand::DeactivateItem(DeactivateItem {
                tenant_id,
                item_id,
                reason: reason.to_string(),
                occurred_at: now,
            })))
        })?;

        match self
            .alerts
            .close_all_for_item(tenant_id, item_id, SYSTEM_ACTOR, "item deactivated")
        {
            Ok(closed) => debug!(tenant = %tenant_id, item_id = %item_id, closed, "closed alerts of deactivated item"),
            Err(e) => warn!(tenant = %tenant_id, item_id = %item_id, error = %e, "failed to close alerts"),
        }
        Ok(update.item)
    }

    pub fn get_item(&self, tenant_id: TenantId, item_id: InventoryItemId) -> DomainResult<InventoryItem> {
        self.items
            .get(tenant_id, item_id)?
            .ok_or_else(|| DomainError::not_found(format!("inventory item {item_id}")))
    }

    pub fn find_by_sku(&self, tenant_id: TenantId, sku: &str) -> DomainResult<Option<InventoryItem>> {
        Ok(self.items.find_by_sku(tenant_id, sku)?)
    }

    pub fn list_items(&self, tenant_id: TenantId) -> DomainResult<Vec<InventoryItem>> {
        Ok(self.items.list(tenant_id)?)
    }

    pub fn list_active_items(&self, tenant_id: TenantId) -> DomainResult<Vec<InventoryItem>> {
        Ok(self
            .items
            .list(tenant_id)?
            .into_iter()
            .filter(InventoryItem::is_active)
            .collect())
    }

    pub fn list_movements(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
    ) -> DomainResult<Vec<StockMovement>> {
        Ok(self.movements.list_for_item(tenant_id, item_id)?)
    }

    /// Load, decide, save with a version check, append movements, refresh alerts.
    ///
    /// `build` returning `None` means nothing to do; the current item is returned
    /// without a movement.
    fn mutate<F>(&self, tenant_id: TenantId, item_id: InventoryItemId, build: F) -> DomainResult<LedgerUpdate>
    where
        F: Fn(&InventoryItem, DateTime<Utc>) -> DomainResult<Option<InventoryCommand>>,
    {
        let mut attempt = 0;
        loop {
            let mut item = self.get_item(tenant_id, item_id)?;
            let Some(command) = build(&item, self.clock.now())? else {
                return Ok(LedgerUpdate {
                    item,
                    movement: None,
                    alerts: Vec::new(),
                });
            };

            let expected = ExpectedVersion::Exact(item.version());
            let events = execute(&mut item, &command)?;
            if events.is_empty() {
                return Ok(LedgerUpdate {
                    item,
                    movement: None,
                    alerts: Vec::new(),
                });
            }

            match self.items.save(tenant_id, &item, expected) {
                Ok(()) => {
                    let movement = self.append_movements(&events)?;
                    if let Some(m) = &movement {
                        debug!(
                            tenant = %tenant_id,
                            item_id = %item_id,
                            movement_type = m.movement_type().as_str(),
                            quantity = m.quantity(),
                            new_stock = m.new_stock(),
                            "stock movement recorded"
                        );
                    }
                    let alerts = self.refresh_alerts(&item);
                    return Ok(LedgerUpdate {
                        item,
                        movement,
                        alerts,
                    });
                }
                Err(e) if e.is_version_conflict() && attempt < self.conflict_retries => {
                    attempt += 1;
                    debug!(tenant = %tenant_id, item_id = %item_id, attempt, "version conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Persist the movements carried by `events`; returns the last one.
    fn append_movements(&self, events: &[InventoryEvent]) -> DomainResult<Option<StockMovement>> {
        let mut last = None;
        for movement in events.iter().filter_map(InventoryEvent::movement) {
            self.movements.append(movement.clone())?;
            last = Some(movement.clone());
        }
        Ok(last)
    }

    fn refresh_alerts(&self, item: &InventoryItem) -> Vec<StockAlert> {
        match self.alerts.check_thresholds(item) {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!(item_id = %item.id_typed(), error = %e, "threshold alert check failed");
                Vec::new()
            }
        }
    }

    fn load_movement(&self, tenant_id: TenantId, movement_id: MovementId) -> DomainResult<StockMovement> {
        self.movements
            .get(tenant_id, movement_id)?
            .ok_or_else(|| DomainError::not_found(format!("movement {movement_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use crate::store::StoreError;
    use crate::test_support::Harness;

    #[test]
    fn update_stock_level_records_movement_and_status() {
        let h = Harness::new();
        let item = h.item("LEDGER-1", 100);

        let update = h
            .ledger
            .update_stock_level(h.tenant, item.id_typed(), 15, "cycle count")
            .unwrap();
        let m = update.movement.unwrap();
        assert_eq!((m.previous_stock(), m.quantity(), m.new_stock()), (100, -85, 15));
        assert_eq!(m.movement_type(), MovementType::Adjustment);
        assert_eq!(update.item.available_stock(), 15);

        let err = h
            .ledger
            .update_stock_level(h.tenant, item.id_typed(), -1, "typo")
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(h.ledger.list_movements(h.tenant, item.id_typed()).unwrap().len(), 2);
    }

    #[test]
    fn reservation_is_all_or_nothing() {
        let h = Harness::new();
        let item = h.item("RES-1", 30);

        assert!(h.ledger.reserve_stock(h.tenant, item.id_typed(), 25, None).unwrap());
        assert!(!h.ledger.reserve_stock(h.tenant, item.id_typed(), 10, None).unwrap());

        let item = h.ledger.get_item(h.tenant, item.id_typed()).unwrap();
        assert_eq!((item.stock_level(), item.reserved_stock(), item.available_stock()), (30, 25, 5));

        let released = h
            .ledger
            .release_stock(h.tenant, item.id_typed(), 100, Some("SO-9".to_string()))
            .unwrap();
        assert_eq!(released.item.reserved_stock(), 0);
        assert_eq!(released.movement.unwrap().reserved_delta(), -25);

        let noop = h.ledger.release_stock(h.tenant, item.id_typed(), 5, None).unwrap();
        assert!(noop.movement.is_none());
    }

    #[test]
    fn reversal_restores_level_and_links_both_entries() {
        let h = Harness::new();
        let item = h.item("REV-1", 50);
        let sale = h
            .ledger
            .adjust_stock(
                h.tenant,
                item.id_typed(),
                StockAdjustment {
                    delta: -20,
                    movement_type: MovementType::Sale,
                    reason: "order 17".to_string(),
                    unit_cost: None,
                    reference: Some("SO-17".to_string()),
                },
            )
            .unwrap()
            .movement
            .unwrap();

        let reversed = h
            .ledger
            .reverse_movement(h.tenant, sale.id(), "order cancelled")
            .unwrap();
        let reversal = reversed.movement.unwrap();
        assert_eq!(reversed.item.stock_level(), 50);
        assert_eq!(reversal.movement_type(), MovementType::ManualCorrection);
        assert_eq!(reversal.reverses(), Some(sale.id()));
        assert_eq!(
            (reversal.previous_stock(), reversal.new_stock()),
            (sale.new_stock(), sale.previous_stock())
        );

        let history = h.ledger.list_movements(h.tenant, item.id_typed()).unwrap();
        let original = history.iter().find(|m| m.id() == sale.id()).unwrap();
        assert_eq!(original.reversed_by(), Some(reversal.id()));

        assert!(h.ledger.reverse_movement(h.tenant, sale.id(), "again").unwrap_err().is_conflict());
        assert!(
            h.ledger
                .reverse_movement(h.tenant, reversal.id(), "undo the undo")
                .is_err()
        );
    }

    #[test]
    fn bulk_update_collects_failures() {
        let h = Harness::new();
        let a = h.item("BULK-A", 10);
        let b = h.item("BULK-B", 10);
        let missing = InventoryItemId::generate();

        let outcome = h.ledger.bulk_update(
            h.tenant,
            vec![
                BulkStockUpdate { item_id: a.id_typed(), new_level: 40, reason: "count".to_string() },
                BulkStockUpdate { item_id: missing, new_level: 5, reason: "count".to_string() },
                BulkStockUpdate { item_id: b.id_typed(), new_level: -3, reason: "count".to_string() },
            ],
        );
        assert_eq!(outcome.successful.len(), 1);
        assert_eq!(
            outcome.failed.iter().map(|f| f.item_id).collect::<Vec<_>>(),
            vec![missing, b.id_typed()]
        );
    }

    #[test]
    fn duplicate_sku_is_a_conflict() {
        let h = Harness::new();
        h.item("DUP-1", 1);
        let err = h.ledger.register_item(h.tenant, h.new_item("dup-1", 1)).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn deactivation_closes_alerts_and_freezes_stock() {
        let h = Harness::new();
        let item = h.item("OFF-1", 100);
        h.ledger
            .update_stock_level(h.tenant, item.id_typed(), 0, "empty")
            .unwrap();
        assert!(!h.alerts.list_open(h.tenant).unwrap().is_empty());

        h.ledger.deactivate_item(h.tenant, item.id_typed(), "discontinued").unwrap();
        assert!(h.alerts.list_open(h.tenant).unwrap().is_empty());
        assert!(h
            .ledger
            .update_stock_level(h.tenant, item.id_typed(), 5, "late delivery")
            .is_err());
        assert!(h.ledger.list_active_items(h.tenant).unwrap().is_empty());
    }

    #[test]
    fn price_change_keeps_stock_untouched() {
        let h = Harness::new();
        let item = h.item("PRICE-1", 10);
        let updated = h.ledger.set_price(h.tenant, item.id_typed(), dec!(12.50)).unwrap();
        assert_eq!(updated.price(), Some(dec!(12.50)));
        assert_eq!(h.ledger.list_movements(h.tenant, item.id_typed()).unwrap().len(), 1);
    }

    /// Store that rejects the first `n` saves with a version conflict.
    struct FlakyStore {
        inner: crate::store::InMemoryInventoryStore,
        conflicts: std::sync::Mutex<u32>,
    }

    impl InventoryStore for FlakyStore {
        fn get(&self, t: TenantId, id: InventoryItemId) -> Result<Option<InventoryItem>, StoreError> {
            self.inner.get(t, id)
        }

        fn save(&self, t: TenantId, item: &InventoryItem, expected: ExpectedVersion) -> Result<(), StoreError> {
            let mut left = self.conflicts.lock().unwrap();
            if *left > 0 && expected != ExpectedVersion::Exact(0) {
                *left -= 1;
                return Err(StoreError::VersionConflict { expected, actual: 99 });
            }
            self.inner.save(t, item, expected)
        }

        fn list(&self, t: TenantId) -> Result<Vec<InventoryItem>, StoreError> {
            self.inner.list(t)
        }
    }

    #[test]
    fn version_conflicts_are_retried_then_surfaced() {
        let h = Harness::new();
        let store = Arc::new(FlakyStore {
            inner: crate::store::InMemoryInventoryStore::new(),
            conflicts: std::sync::Mutex::new(2),
        });
        let ledger = StockLedger::new(store.clone(), h.movements.clone(), h.alerts.clone(), h.clock.clone())
            .with_conflict_retries(2);
        let item = ledger.register_item(h.tenant, h.new_item("FLAKY-1", 10)).unwrap().item;

        assert_eq!(
            ledger
                .update_stock_level(h.tenant, item.id_typed(), 30, "count")
                .unwrap()
                .item
                .stock_level(),
            30
        );

        *store.conflicts.lock().unwrap() = 5;
        let err = ledger
            .update_stock_level(h.tenant, item.id_typed(), 40, "count")
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Set(i64),
        Adjust(i64),
        Reserve(i64),
        Release(i64),
        ReverseLast,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0i64..300).prop_map(Op::Set),
            (-50i64..50).prop_map(Op::Adjust),
            (1i64..60).prop_map(Op::Reserve),
            (1i64..60).prop_map(Op::Release),
            Just(Op::ReverseLast),
        ]
    }

    proptest! {
        #[test]
        fn ledger_keeps_stock_and_movements_consistent(ops in prop::collection::vec(op(), 1..30)) {
            let h = Harness::new();
            let item = h.item("PROP-1", 50);
            let id = item.id_typed();

            for op in ops {
                let _ = match op {
                    Op::Set(level) => h.ledger.update_stock_level(h.tenant, id, level, "set").map(|_| ()),
                    Op::Adjust(delta) => h
                        .ledger
                        .adjust_stock(h.tenant, id, StockAdjustment {
                            delta,
                            movement_type: MovementType::Adjustment,
                            reason: "adjust".to_string(),
                            unit_cost: None,
                            reference: None,
                        })
                        .map(|_| ()),
                    Op::Reserve(q) => h.ledger.reserve_stock(h.tenant, id, q, None).map(|_| ()),
                    Op::Release(q) => h.ledger.release_stock(h.tenant, id, q, None).map(|_| ()),
                    Op::ReverseLast => {
                        let last = h.ledger.list_movements(h.tenant, id).unwrap().pop();
                        match last {
                            Some(m) => h.ledger.reverse_movement(h.tenant, m.id(), "undo").map(|_| ()),
                            None => Ok(()),
                        }
                    }
                };

                let item = h.ledger.get_item(h.tenant, id).unwrap();
                prop_assert!(0 <= item.reserved_stock());
                prop_assert!(item.reserved_stock() <= item.stock_level());
                prop_assert_eq!(item.available_stock(), item.stock_level() - item.reserved_stock());
            }

            let movements = h.ledger.list_movements(h.tenant, id).unwrap();
            for m in &movements {
                prop_assert!(m.is_consistent());
            }
            let final_level = h.ledger.get_item(h.tenant, id).unwrap().stock_level();
            prop_assert_eq!(movements.last().map(|m| m.new_stock()), Some(final_level));
        }
    }
}
