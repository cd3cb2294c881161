//! Alert engine: dedupe, lifecycle transitions, threshold checks and the stale sweep.
//!
//! All writes go through one engine-level lock so that at most one open alert exists
//! per `(item, type)` for deduplicated types, even with the ledger, the rule engine
//! and the sweep runner calling in from different threads.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use stockpilot_alerts::{
    AlertId, AlertType, NewAlert, Notification, StockAlert, evaluate_thresholds,
};
use stockpilot_core::{Clock, DomainError, DomainResult, TenantId};
use stockpilot_inventory::{InventoryItem, InventoryItemId};

use crate::sinks::NotificationSink;
use crate::store::TenantStore;

/// Actor recorded on alerts the system raises or clears on its own.
pub const SYSTEM_ACTOR: &str = "system";

pub type AlertStore = dyn TenantStore<AlertId, StockAlert>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StaleSweepReport {
    /// Alerts whose priority went up.
    pub escalated: usize,
    pub notified: usize,
}

pub struct AlertEngine {
    store: Arc<AlertStore>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl AlertEngine {
    pub fn new(
        store: Arc<AlertStore>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Raise an alert, or fold it into the open alert of the same item and type.
    ///
    /// Custom and manual alerts always create a new record. Only newly created alerts
    /// notify here.
    pub fn create_alert(&self, new: NewAlert) -> DomainResult<StockAlert> {
        let _guard = self.lock();
        self.raise(new, self.clock.now())
    }

    /// Raise every threshold alert the item currently calls for and resolve open
    /// threshold alerts whose condition no longer holds.
    ///
    /// Only alerts raised by the threshold check itself are auto-resolved; alerts a
    /// rule or a user raised stay open until someone resolves them.
    ///
    /// Returns the raised (or merged) alerts.
    pub fn check_thresholds(&self, item: &InventoryItem) -> DomainResult<Vec<StockAlert>> {
        let item_id = item.id_typed();
        let tenant_id = item
            .tenant_id()
            .ok_or_else(|| DomainError::not_found(format!("inventory item {item_id}")))?;
        let assessment = evaluate_thresholds(item);

        let _guard = self.lock();
        let now = self.clock.now();

        let mut raised = Vec::with_capacity(assessment.raised.len());
        for candidate in assessment.raised {
            raised.push(self.raise(
                NewAlert {
                    tenant_id,
                    item_id,
                    alert_type: candidate.alert_type,
                    priority: candidate.priority,
                    message: candidate.message,
                    details: candidate.details,
                    notification_settings: None,
                    created_by: SYSTEM_ACTOR.to_string(),
                },
                now,
            )?);
        }

        if !assessment.cleared.is_empty() {
            let cleared = self
                .store
                .list(tenant_id)?
                .into_iter()
                .filter(|a| {
                    a.item_id() == item_id
                        && a.is_open()
                        && a.created_by() == SYSTEM_ACTOR
                        && assessment.cleared.contains(&a.alert_type())
                });
            for mut alert in cleared {
                alert.resolve(SYSTEM_ACTOR, Some("condition cleared".to_string()), now)?;
                self.save(&alert)?;
                info!(
                    tenant = %tenant_id,
                    item_id = %item_id,
                    alert_id = %alert.id_typed(),
                    alert_type = alert.alert_type().as_str(),
                    "threshold alert auto-resolved"
                );
            }
        }

        Ok(raised)
    }

    pub fn acknowledge(&self, tenant_id: TenantId, alert_id: AlertId, by: &str) -> DomainResult<StockAlert> {
        self.transition(tenant_id, alert_id, |alert, now| alert.acknowledge(by, now))
    }

    /// Errors if the alert is already resolved.
    pub fn resolve(
        &self,
        tenant_id: TenantId,
        alert_id: AlertId,
        by: &str,
        notes: Option<String>,
    ) -> DomainResult<StockAlert> {
        self.transition(tenant_id, alert_id, |alert, now| alert.resolve(by, notes, now))
    }

    /// Reactivate a resolved alert. Rejected while another open alert of the same
    /// deduplicated type exists for the item.
    pub fn reopen(&self, tenant_id: TenantId, alert_id: AlertId, reason: &str) -> DomainResult<StockAlert> {
        let _guard = self.lock();
        let mut alert = self.load(tenant_id, alert_id)?;
        if alert.alert_type().is_deduplicated()
            && let Some(open) = self.find_open(tenant_id, alert.item_id(), alert.alert_type())?
        {
            return Err(DomainError::conflict(format!(
                "alert {} is already open for this item",
                open.id_typed()
            )));
        }
        alert.reopen(reason, self.clock.now())?;
        self.save(&alert)?;
        Ok(alert)
    }

    /// Raise priority one level and notify if the gate allows.
    pub fn escalate(&self, tenant_id: TenantId, alert_id: AlertId) -> DomainResult<StockAlert> {
        let _guard = self.lock();
        let now = self.clock.now();
        let mut alert = self.load(tenant_id, alert_id)?;
        let priority = alert.escalate(now)?;
        self.notify(&mut alert, now);
        self.save(&alert)?;
        info!(
            tenant = %tenant_id,
            alert_id = %alert_id,
            priority = priority.as_str(),
            "alert escalated"
        );
        Ok(alert)
    }

    /// Escalate every stale open alert and re-notify where the gate allows.
    ///
    /// Critical alerts cannot go higher; escalating them restarts their staleness
    /// window, so they re-notify at most once per window.
    pub fn sweep_stale(&self, tenant_id: TenantId) -> DomainResult<StaleSweepReport> {
        let _guard = self.lock();
        let now = self.clock.now();
        let mut report = StaleSweepReport::default();

        let stale = self
            .store
            .list(tenant_id)?
            .into_iter()
            .filter(|a| a.is_stale(now));
        for mut alert in stale {
            let before = alert.priority();
            let after = alert.escalate(now)?;
            if after != before {
                report.escalated += 1;
            }
            if self.notify(&mut alert, now) {
                report.notified += 1;
            }
            self.save(&alert)?;
        }

        if report != StaleSweepReport::default() {
            info!(
                tenant = %tenant_id,
                escalated = report.escalated,
                notified = report.notified,
                "stale alert sweep"
            );
        }
        Ok(report)
    }

    /// Resolve every open alert of an item. Returns how many were closed.
    pub fn close_all_for_item(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        by: &str,
        notes: &str,
    ) -> DomainResult<usize> {
        let _guard = self.lock();
        let now = self.clock.now();
        let mut closed = 0;
        for mut alert in self.list_for_item(tenant_id, item_id)? {
            if !alert.is_open() {
                continue;
            }
            alert.resolve(by, Some(notes.to_string()), now)?;
            self.save(&alert)?;
            closed += 1;
        }
        Ok(closed)
    }

    pub fn get(&self, tenant_id: TenantId, alert_id: AlertId) -> DomainResult<StockAlert> {
        self.load(tenant_id, alert_id)
    }

    /// Open alerts, most urgent first, then oldest trigger first.
    pub fn list_open(&self, tenant_id: TenantId) -> DomainResult<Vec<StockAlert>> {
        let mut open: Vec<_> = self
            .store
            .list(tenant_id)?
            .into_iter()
            .filter(StockAlert::is_open)
            .collect();
        open.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then(a.triggered_at().cmp(&b.triggered_at()))
        });
        Ok(open)
    }

    /// Every alert of an item, oldest first.
    pub fn list_for_item(&self, tenant_id: TenantId, item_id: InventoryItemId) -> DomainResult<Vec<StockAlert>> {
        let mut alerts: Vec<_> = self
            .store
            .list(tenant_id)?
            .into_iter()
            .filter(|a| a.item_id() == item_id)
            .collect();
        alerts.sort_by_key(StockAlert::created_at);
        Ok(alerts)
    }

    fn raise(&self, new: NewAlert, now: DateTime<Utc>) -> DomainResult<StockAlert> {
        if new.message.trim().is_empty() {
            return Err(DomainError::validation("alert message cannot be empty"));
        }

        if new.alert_type.is_deduplicated()
            && let Some(mut open) = self.find_open(new.tenant_id, new.item_id, new.alert_type)?
        {
            open.absorb(new.priority, new.message, new.details, now)?;
            self.save(&open)?;
            debug!(
                tenant = %open.tenant_id(),
                alert_id = %open.id_typed(),
                alert_type = open.alert_type().as_str(),
                "merged repeated trigger into open alert"
            );
            return Ok(open);
        }

        let mut alert = StockAlert::new(AlertId::generate(), new, now);
        self.notify(&mut alert, now);
        self.save(&alert)?;
        info!(
            tenant = %alert.tenant_id(),
            item_id = %alert.item_id(),
            alert_id = %alert.id_typed(),
            alert_type = alert.alert_type().as_str(),
            priority = alert.priority().as_str(),
            "alert created"
        );
        Ok(alert)
    }

    fn transition<F>(&self, tenant_id: TenantId, alert_id: AlertId, f: F) -> DomainResult<StockAlert>
    where
        F: FnOnce(&mut StockAlert, DateTime<Utc>) -> DomainResult<()>,
    {
        let _guard = self.lock();
        let mut alert = self.load(tenant_id, alert_id)?;
        f(&mut alert, self.clock.now())?;
        self.save(&alert)?;
        Ok(alert)
    }

    /// Send through the sink if the gate allows. Delivery failures are logged only.
    fn notify(&self, alert: &mut StockAlert, now: DateTime<Utc>) -> bool {
        if !alert.should_notify(now) {
            return false;
        }
        match self.notifier.send(&Notification::for_alert(alert)) {
            Ok(()) => {
                alert.mark_notified(now);
                true
            }
            Err(e) => {
                warn!(alert_id = %alert.id_typed(), error = %e, "alert notification failed");
                false
            }
        }
    }

    fn find_open(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        alert_type: AlertType,
    ) -> DomainResult<Option<StockAlert>> {
        Ok(self
            .store
            .list(tenant_id)?
            .into_iter()
            .find(|a| a.item_id() == item_id && a.alert_type() == alert_type && a.is_open()))
    }

    fn load(&self, tenant_id: TenantId, alert_id: AlertId) -> DomainResult<StockAlert> {
        self.store
            .get(tenant_id, &alert_id)?
            .ok_or_else(|| DomainError::not_found(format!("alert {alert_id}")))
    }

    fn save(&self, alert: &StockAlert) -> DomainResult<()> {
        self.store
            .upsert(alert.tenant_id(), alert.id_typed(), alert.clone())
            .map_err(DomainError::from)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::{Map, json};

    use stockpilot_alerts::{AlertPriority, AlertStatus, NotificationFrequency, NotificationSettings};

    use stockpilot_inventory::MovementType;

    use crate::ledger::StockAdjustment;
    use crate::test_support::Harness;

    fn manual(h: &Harness, alert_type: AlertType, priority: AlertPriority) -> NewAlert {
        NewAlert {
            tenant_id: h.tenant,
            item_id: h.item("ALERT-1", 100).id_typed(),
            alert_type,
            priority,
            message: "check the shelf".to_string(),
            details: Map::new(),
            notification_settings: None,
            created_by: "ops".to_string(),
        }
    }

    #[test]
    fn repeated_triggers_merge_into_one_open_alert() {
        let h = Harness::new();
        let item = h.item("DEDUPE-1", 100);
        let mut details = Map::new();
        details.insert("source".to_string(), json!("first"));
        let first = NewAlert {
            tenant_id: h.tenant,
            item_id: item.id_typed(),
            alert_type: AlertType::LowStock,
            priority: AlertPriority::Medium,
            message: "low".to_string(),
            details,
            notification_settings: None,
            created_by: "ops".to_string(),
        };
        let mut second = first.clone();
        second.details = Map::from_iter([("extra".to_string(), json!(7))]);

        let a = h.alerts.create_alert(first).unwrap();
        h.clock.advance(Duration::minutes(5));
        let b = h.alerts.create_alert(second).unwrap();

        assert_eq!(a.id_typed(), b.id_typed());
        assert_eq!(b.occurrence_count(), 1);
        assert_eq!(b.details()["source"], json!("first"));
        assert_eq!(b.details()["extra"], json!(7));
        assert_eq!(b.triggered_at(), h.clock.now());
        assert_eq!(h.alerts.list_open(h.tenant).unwrap().len(), 1);
    }

    #[test]
    fn manual_alerts_are_never_merged() {
        let h = Harness::new();
        let new = manual(&h, AlertType::Manual, AlertPriority::Low);
        let a = h.alerts.create_alert(new.clone()).unwrap();
        let b = h.alerts.create_alert(new).unwrap();
        assert_ne!(a.id_typed(), b.id_typed());
    }

    #[test]
    fn threshold_check_raises_low_stock_and_one_reorder() {
        let h = Harness::new();
        let item = h.item("LOW-1", 100);

        let update = h
            .ledger
            .update_stock_level(h.tenant, item.id_typed(), 15, "cycle count")
            .unwrap();
        let mut types: Vec<_> = update.alerts.iter().map(|a| a.alert_type()).collect();
        types.sort_by_key(|t| t.as_str());
        assert_eq!(types, vec![AlertType::LowStock, AlertType::ReorderNeeded]);

        // A second check merges instead of duplicating.
        h.alerts.check_thresholds(&update.item).unwrap();
        let open = h.alerts.list_for_item(h.tenant, item.id_typed()).unwrap();
        assert_eq!(open.len(), 2);
        assert!(open.iter().all(|a| a.occurrence_count() == 1));
    }

    #[test]
    fn cleared_conditions_resolve_as_system() {
        let h = Harness::new();
        let item = h.item("CLEAR-1", 100);
        h.ledger
            .update_stock_level(h.tenant, item.id_typed(), 0, "stocktake")
            .unwrap();
        assert_eq!(h.alerts.list_open(h.tenant).unwrap()[0].alert_type(), AlertType::OutOfStock);

        h.ledger
            .update_stock_level(h.tenant, item.id_typed(), 100, "delivery")
            .unwrap();
        assert!(h.alerts.list_open(h.tenant).unwrap().is_empty());
        let history = h.alerts.list_for_item(h.tenant, item.id_typed()).unwrap();
        assert!(history.iter().all(|a| a.resolved_by() == Some(SYSTEM_ACTOR)));
    }

    #[test]
    fn rule_raised_reorder_survives_unrelated_writes() {
        let h = Harness::new();
        let item = h.item("RULE-RO-1", 150);
        let raised = h
            .alerts
            .create_alert(NewAlert {
                tenant_id: h.tenant,
                item_id: item.id_typed(),
                alert_type: AlertType::ReorderNeeded,
                priority: AlertPriority::Medium,
                message: "reorder 40".to_string(),
                details: Map::from_iter([("recommendedQuantity".to_string(), json!(40))]),
                notification_settings: None,
                created_by: "rule:weekly-top-up".to_string(),
            })
            .unwrap();

        assert!(h.ledger.reserve_stock(h.tenant, item.id_typed(), 1, None).unwrap());
        h.ledger.release_stock(h.tenant, item.id_typed(), 1, None).unwrap();
        h.ledger
            .adjust_stock(
                h.tenant,
                item.id_typed(),
                StockAdjustment {
                    delta: 5,
                    movement_type: MovementType::Adjustment,
                    reason: "found on shelf".to_string(),
                    unit_cost: None,
                    reference: None,
                },
            )
            .unwrap();

        let alert = h.alerts.get(h.tenant, raised.id_typed()).unwrap();
        assert!(alert.is_open());
        assert_eq!(alert.resolved_by(), None);
    }

    #[test]
    fn resolving_twice_is_rejected() {
        let h = Harness::new();
        let alert = h.alerts.create_alert(manual(&h, AlertType::Custom, AlertPriority::High)).unwrap();
        h.clock.advance(Duration::minutes(42));
        let resolved = h
            .alerts
            .resolve(h.tenant, alert.id_typed(), "ops", Some("restocked".to_string()))
            .unwrap();
        assert_eq!(resolved.resolution_minutes(), Some(42));

        let err = h
            .alerts
            .resolve(h.tenant, alert.id_typed(), "ops", None)
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(h.alerts.get(h.tenant, alert.id_typed()).unwrap().resolved_at(), resolved.resolved_at());
    }

    #[test]
    fn reopen_refuses_to_duplicate_an_open_alert() {
        let h = Harness::new();
        let new = manual(&h, AlertType::LowStock, AlertPriority::Medium);
        let first = h.alerts.create_alert(new.clone()).unwrap();
        h.alerts.resolve(h.tenant, first.id_typed(), "ops", None).unwrap();
        let second = h.alerts.create_alert(new).unwrap();
        assert_ne!(first.id_typed(), second.id_typed());

        assert!(h.alerts.reopen(h.tenant, first.id_typed(), "again").unwrap_err().is_conflict());

        h.alerts.resolve(h.tenant, second.id_typed(), "ops", None).unwrap();
        let reopened = h.alerts.reopen(h.tenant, first.id_typed(), "again").unwrap();
        assert_eq!(reopened.status(), AlertStatus::Active);
        assert_eq!(reopened.occurrence_count(), 2);
    }

    #[test]
    fn stale_sweep_escalates_once_per_window() {
        let h = Harness::new();
        let alert = h.alerts.create_alert(manual(&h, AlertType::Custom, AlertPriority::High)).unwrap();
        let sent_at_creation = h.notifier.all().len();

        h.clock.advance(Duration::hours(3));
        assert_eq!(h.alerts.sweep_stale(h.tenant).unwrap(), StaleSweepReport::default());

        h.clock.advance(Duration::hours(2));
        let report = h.alerts.sweep_stale(h.tenant).unwrap();
        assert_eq!(report, StaleSweepReport { escalated: 1, notified: 1 });
        let escalated = h.alerts.get(h.tenant, alert.id_typed()).unwrap();
        assert_eq!(escalated.priority(), AlertPriority::Critical);
        assert_eq!(h.notifier.all().len(), sent_at_creation + 1);

        // The window restarted at the escalation.
        h.clock.advance(Duration::minutes(30));
        assert_eq!(h.alerts.sweep_stale(h.tenant).unwrap().escalated, 0);
    }

    #[test]
    fn hourly_settings_throttle_escalation_notices() {
        let h = Harness::new();
        let mut new = manual(&h, AlertType::Custom, AlertPriority::Low);
        new.notification_settings = Some(NotificationSettings {
            frequency: NotificationFrequency::Hourly,
            ..NotificationSettings::default()
        });
        let alert = h.alerts.create_alert(new).unwrap();
        assert_eq!(h.notifier.all().len(), 1);

        h.clock.advance(Duration::minutes(10));
        h.alerts.escalate(h.tenant, alert.id_typed()).unwrap();
        assert_eq!(h.notifier.all().len(), 1);

        h.clock.advance(Duration::hours(1));
        h.alerts.escalate(h.tenant, alert.id_typed()).unwrap();
        assert_eq!(h.notifier.all().len(), 2);
    }

    #[test]
    fn failed_delivery_does_not_fail_creation() {
        let h = Harness::new();
        h.notifier.set_failing(true);
        let alert = h
            .alerts
            .create_alert(manual(&h, AlertType::Custom, AlertPriority::Critical))
            .unwrap();
        assert!(alert.last_notification_sent().is_none());
        assert!(h.alerts.get(h.tenant, alert.id_typed()).is_ok());
    }
}
