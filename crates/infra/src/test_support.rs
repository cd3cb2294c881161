//! Shared fixtures for the infra unit and integration tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal_macros::dec;

use stockpilot_alerts::{AlertId, StockAlert};
use stockpilot_core::{ManualClock, TenantId};
use stockpilot_inventory::{InventoryItem, StockThresholds};
use stockpilot_rules::{AutomationRule, RuleId};

use crate::alert_engine::AlertEngine;
use crate::jobs::{InMemoryJobStore, RetryPolicy};
use crate::ledger::{NewItem, StockLedger};
use crate::rule_engine::{ActionExecutor, RuleEngine, RuleEngineConfig};
use crate::sinks::{InMemoryNotificationSink, InMemoryPriceAuditSink};
use crate::store::{InMemoryInventoryStore, InMemoryMovementStore, InMemoryTenantStore};

/// Monday 2024-06-03 10:00 UTC.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()
}

/// min 10, max 200, reorder at 20 for 50, auto-reorder on.
pub fn thresholds() -> StockThresholds {
    StockThresholds {
        minimum_stock: 10,
        maximum_stock: 200,
        reorder_point: 20,
        reorder_quantity: 50,
        auto_reorder: true,
    }
}

pub fn engine_config() -> RuleEngineConfig {
    RuleEngineConfig {
        inter_rule_delay: Duration::ZERO,
        inter_item_delay: Duration::ZERO,
        sweep_budget: Duration::from_secs(60),
        action_timeout: Duration::from_secs(5),
        deferred_retry: RetryPolicy::fixed(2, Duration::from_secs(60)),
        execution_lease: Duration::from_secs(600),
    }
}

/// Fully wired in-memory core for one tenant, on a manual clock.
pub struct Harness {
    pub tenant: TenantId,
    pub clock: Arc<ManualClock>,
    pub items: Arc<InMemoryInventoryStore>,
    pub movements: Arc<InMemoryMovementStore>,
    pub alert_store: Arc<InMemoryTenantStore<AlertId, StockAlert>>,
    pub rule_store: Arc<InMemoryTenantStore<RuleId, AutomationRule>>,
    pub notifier: Arc<InMemoryNotificationSink>,
    pub price_audit: Arc<InMemoryPriceAuditSink>,
    pub jobs: Arc<InMemoryJobStore>,
    pub alerts: Arc<AlertEngine>,
    pub ledger: Arc<StockLedger>,
    pub rules: Arc<RuleEngine>,
}

impl Harness {
    pub fn new() -> Self {
        let tenant = TenantId::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let items = Arc::new(InMemoryInventoryStore::new());
        let movements = Arc::new(InMemoryMovementStore::new());
        let alert_store: Arc<InMemoryTenantStore<AlertId, StockAlert>> = Arc::new(InMemoryTenantStore::new());
        let rule_store: Arc<InMemoryTenantStore<RuleId, AutomationRule>> = Arc::new(InMemoryTenantStore::new());
        let notifier = Arc::new(InMemoryNotificationSink::new());
        let price_audit = Arc::new(InMemoryPriceAuditSink::new());
        let jobs = InMemoryJobStore::arc();

        let alerts = Arc::new(AlertEngine::new(alert_store.clone(), notifier.clone(), clock.clone()));
        let ledger = Arc::new(StockLedger::new(
            items.clone(),
            movements.clone(),
            alerts.clone(),
            clock.clone(),
        ));
        let actions = ActionExecutor::new(
            ledger.clone(),
            alerts.clone(),
            notifier.clone(),
            price_audit.clone(),
            clock.clone(),
        );
        let rules = Arc::new(RuleEngine::new(
            rule_store.clone(),
            ledger.clone(),
            actions,
            jobs.clone(),
            clock.clone(),
            engine_config(),
        ));

        Self {
            tenant,
            clock,
            items,
            movements,
            alert_store,
            rule_store,
            notifier,
            price_audit,
            jobs,
            alerts,
            ledger,
            rules,
        }
    }

    /// Hardware item from `SUP-1` priced 10.00 at cost 6.00.
    pub fn new_item(&self, sku: &str, stock: i64) -> NewItem {
        NewItem {
            sku: sku.to_string(),
            name: format!("Item {sku}"),
            category: Some("hardware".to_string()),
            supplier_id: Some("SUP-1".to_string()),
            price: Some(dec!(10.00)),
            unit_cost: Some(dec!(6.00)),
            thresholds: thresholds(),
            initial_stock: stock,
        }
    }

    /// Register an item through the ledger.
    pub fn item(&self, sku: &str, stock: i64) -> InventoryItem {
        self.ledger
            .register_item(self.tenant, self.new_item(sku, stock))
            .unwrap()
            .item
    }
}
