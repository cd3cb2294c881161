use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use stockpilot_core::{AggregateRoot, DomainError, DomainResult, TenantId, typed_id};
use stockpilot_inventory::InventoryItemId;

use crate::notification::{NotificationFrequency, NotificationSettings};

typed_id!(
    /// Stock alert identifier.
    AlertId
);

/// What an alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    LowStock,
    OutOfStock,
    ReorderNeeded,
    Overstock,
    Custom,
    Manual,
}

impl AlertType {
    /// Threshold alerts are raised and cleared by the ledger's threshold check.
    pub const THRESHOLD: [AlertType; 4] = [
        AlertType::LowStock,
        AlertType::OutOfStock,
        AlertType::ReorderNeeded,
        AlertType::Overstock,
    ];

    /// Custom and manual alerts always create a new record.
    pub fn is_deduplicated(self) -> bool {
        !matches!(self, AlertType::Custom | AlertType::Manual)
    }

    pub fn is_threshold(self) -> bool {
        Self::THRESHOLD.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::LowStock => "low_stock",
            AlertType::OutOfStock => "out_of_stock",
            AlertType::ReorderNeeded => "reorder_needed",
            AlertType::Overstock => "overstock",
            AlertType::Custom => "custom",
            AlertType::Manual => "manual",
        }
    }
}

/// Alert urgency. Ordered: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertPriority {
    /// Next level up; critical is absorbing.
    pub fn escalate(self) -> AlertPriority {
        match self {
            AlertPriority::Low => AlertPriority::Medium,
            AlertPriority::Medium => AlertPriority::High,
            AlertPriority::High | AlertPriority::Critical => AlertPriority::Critical,
        }
    }

    /// Age after which an open alert of this priority is stale.
    pub fn stale_after(self) -> Duration {
        match self {
            AlertPriority::Critical => Duration::hours(1),
            AlertPriority::High => Duration::hours(4),
            AlertPriority::Medium => Duration::hours(24),
            AlertPriority::Low => Duration::hours(72),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertPriority::Low => "low",
            AlertPriority::Medium => "medium",
            AlertPriority::High => "high",
            AlertPriority::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

/// Input for a new alert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub message: String,
    pub details: Map<String, Value>,
    pub notification_settings: Option<NotificationSettings>,
    /// Who raised it (`"ledger"`, a rule id, a user).
    pub created_by: String,
}

/// An operational warning attached to an inventory item.
///
/// Lifecycle: `Active -> Acknowledged -> Resolved`, with `reopen` taking a resolved
/// alert back to `Active`. Alerts are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAlert {
    id: AlertId,
    tenant_id: TenantId,
    item_id: InventoryItemId,
    alert_type: AlertType,
    priority: AlertPriority,
    status: AlertStatus,
    message: String,
    details: Map<String, Value>,
    occurrence_count: u32,
    created_by: String,
    created_at: DateTime<Utc>,
    triggered_at: DateTime<Utc>,
    acknowledged_at: Option<DateTime<Utc>>,
    acknowledged_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
    resolution_notes: Option<String>,
    resolution_minutes: Option<i64>,
    reopen_reason: Option<String>,
    last_escalated_at: Option<DateTime<Utc>>,
    notification_settings: Option<NotificationSettings>,
    last_notification_sent: Option<DateTime<Utc>>,
    version: u64,
}

impl StockAlert {
    pub fn new(id: AlertId, new: NewAlert, now: DateTime<Utc>) -> Self {
        Self {
            id,
            tenant_id: new.tenant_id,
            item_id: new.item_id,
            alert_type: new.alert_type,
            priority: new.priority,
            status: AlertStatus::Active,
            message: new.message,
            details: new.details,
            occurrence_count: 1,
            created_by: new.created_by,
            created_at: now,
            triggered_at: now,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
            resolution_notes: None,
            resolution_minutes: None,
            reopen_reason: None,
            last_escalated_at: None,
            notification_settings: new.notification_settings,
            last_notification_sent: None,
            version: 1,
        }
    }

    pub fn id_typed(&self) -> AlertId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn item_id(&self) -> InventoryItemId {
        self.item_id
    }

    pub fn alert_type(&self) -> AlertType {
        self.alert_type
    }

    pub fn priority(&self) -> AlertPriority {
        self.priority
    }

    pub fn status(&self) -> AlertStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    pub fn occurrence_count(&self) -> u32 {
        self.occurrence_count
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn triggered_at(&self) -> DateTime<Utc> {
        self.triggered_at
    }

    pub fn acknowledged_by(&self) -> Option<&str> {
        self.acknowledged_by.as_deref()
    }

    pub fn acknowledged_at(&self) -> Option<DateTime<Utc>> {
        self.acknowledged_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn resolved_by(&self) -> Option<&str> {
        self.resolved_by.as_deref()
    }

    pub fn resolution_notes(&self) -> Option<&str> {
        self.resolution_notes.as_deref()
    }

    pub fn resolution_minutes(&self) -> Option<i64> {
        self.resolution_minutes
    }

    pub fn reopen_reason(&self) -> Option<&str> {
        self.reopen_reason.as_deref()
    }

    pub fn last_escalated_at(&self) -> Option<DateTime<Utc>> {
        self.last_escalated_at
    }

    pub fn notification_settings(&self) -> Option<&NotificationSettings> {
        self.notification_settings.as_ref()
    }

    pub fn last_notification_sent(&self) -> Option<DateTime<Utc>> {
        self.last_notification_sent
    }

    /// Active or acknowledged. Open alerts occupy the `(item, type)` dedupe slot.
    pub fn is_open(&self) -> bool {
        self.status != AlertStatus::Resolved
    }

    pub fn is_resolved(&self) -> bool {
        self.status == AlertStatus::Resolved
    }

    /// Fold a repeated trigger into this alert.
    ///
    /// New details overwrite keys of the same name, the trigger time is refreshed and
    /// the priority only ever moves up. The occurrence count is left alone.
    pub fn absorb(
        &mut self,
        priority: AlertPriority,
        message: String,
        details: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.is_open() {
            return Err(DomainError::invariant("cannot merge into a resolved alert"));
        }
        self.details.extend(details);
        self.message = message;
        self.priority = self.priority.max(priority);
        self.triggered_at = now;
        self.touch();
        Ok(())
    }

    pub fn acknowledge(&mut self, by: &str, now: DateTime<Utc>) -> DomainResult<()> {
        match self.status {
            AlertStatus::Active => {
                self.status = AlertStatus::Acknowledged;
                self.acknowledged_at = Some(now);
                self.acknowledged_by = Some(by.to_string());
                self.touch();
                Ok(())
            }
            AlertStatus::Acknowledged => Err(DomainError::conflict(format!(
                "alert {} is already acknowledged",
                self.id
            ))),
            AlertStatus::Resolved => Err(DomainError::conflict(format!(
                "alert {} is resolved",
                self.id
            ))),
        }
    }

    pub fn resolve(&mut self, by: &str, notes: Option<String>, now: DateTime<Utc>) -> DomainResult<()> {
        if self.is_resolved() {
            return Err(DomainError::conflict(format!(
                "alert {} is already resolved",
                self.id
            )));
        }
        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(now);
        self.resolved_by = Some(by.to_string());
        self.resolution_notes = notes;
        self.resolution_minutes = Some((now - self.triggered_at).num_minutes());
        self.touch();
        Ok(())
    }

    pub fn reopen(&mut self, reason: &str, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_resolved() {
            return Err(DomainError::conflict(format!(
                "alert {} is not resolved",
                self.id
            )));
        }
        self.status = AlertStatus::Active;
        self.resolved_at = None;
        self.resolved_by = None;
        self.resolution_notes = None;
        self.resolution_minutes = None;
        self.acknowledged_at = None;
        self.acknowledged_by = None;
        self.reopen_reason = Some(reason.to_string());
        self.last_escalated_at = None;
        self.occurrence_count += 1;
        self.triggered_at = now;
        self.touch();
        Ok(())
    }

    /// Raise priority one level and count the occurrence. Returns the new priority.
    ///
    /// The staleness clock restarts from the escalation.
    pub fn escalate(&mut self, now: DateTime<Utc>) -> DomainResult<AlertPriority> {
        if self.is_resolved() {
            return Err(DomainError::conflict(format!(
                "alert {} is resolved",
                self.id
            )));
        }
        self.priority = self.priority.escalate();
        self.occurrence_count += 1;
        self.last_escalated_at = Some(now);
        self.touch();
        Ok(self.priority)
    }

    /// Open and older than its priority's staleness window, measured from the
    /// latest trigger or escalation.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let since = self
            .last_escalated_at
            .map_or(self.triggered_at, |at| at.max(self.triggered_at));
        self.is_open() && now - since > self.priority.stale_after()
    }

    /// Notification gate.
    ///
    /// Critical alerts always pass. Without settings every trigger notifies; otherwise
    /// the configured frequency is measured against the last notification sent.
    pub fn should_notify(&self, now: DateTime<Utc>) -> bool {
        if self.priority == AlertPriority::Critical {
            return true;
        }
        let Some(settings) = &self.notification_settings else {
            return true;
        };
        if !settings.enabled {
            return false;
        }
        let Some(last) = self.last_notification_sent else {
            return true;
        };
        match settings.frequency {
            NotificationFrequency::Immediate => true,
            NotificationFrequency::Hourly => now - last >= Duration::hours(1),
            NotificationFrequency::Daily => now - last >= Duration::days(1),
        }
    }

    pub fn mark_notified(&mut self, now: DateTime<Utc>) {
        self.last_notification_sent = Some(now);
        self.touch();
    }

    fn touch(&mut self) {
        self.version += 1;
    }
}

impl AggregateRoot for StockAlert {
    type Id = AlertId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
