//! Outbound sinks: notification delivery and the price-change audit trail.
//!
//! Neither is part of the domain state. Notifications are fire-and-forget (callers
//! log failures and move on); audit entries are append-only.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use stockpilot_alerts::Notification;
use stockpilot_core::TenantId;
use stockpilot_inventory::InventoryItemId;
use stockpilot_rules::RuleId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("sink lock poisoned")]
    Poisoned,
}

pub trait NotificationSink: Send + Sync + 'static {
    fn send(&self, notification: &Notification) -> Result<(), SinkError>;
}

/// Captures notifications for tests. Can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct InMemoryNotificationSink {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn send(&self, notification: &Notification) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Delivery("sink unavailable".to_string()));
        }
        self.sent
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .push(notification.clone());
        Ok(())
    }
}

/// Writes notifications to the log. Used by the worker until a real channel is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn send(&self, notification: &Notification) -> Result<(), SinkError> {
        info!(
            tenant = %notification.tenant_id,
            priority = notification.priority.as_str(),
            channels = ?notification.channels,
            recipients = notification.recipients.len(),
            subject = %notification.subject,
            "notification dispatched"
        );
        Ok(())
    }
}

/// One evaluated price change, committed or skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceAuditEntry {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub rule_id: Option<RuleId>,
    pub previous_price: Option<Decimal>,
    pub new_price: Decimal,
    pub change_percent: Option<Decimal>,
    pub applied: bool,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

pub trait PriceAuditSink: Send + Sync + 'static {
    fn record(&self, entry: PriceAuditEntry) -> Result<(), SinkError>;
}

#[derive(Debug, Default)]
pub struct InMemoryPriceAuditSink {
    entries: Mutex<Vec<PriceAuditEntry>>,
}

impl InMemoryPriceAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<PriceAuditEntry> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl PriceAuditSink for InMemoryPriceAuditSink {
    fn record(&self, entry: PriceAuditEntry) -> Result<(), SinkError> {
        self.entries
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .push(entry);
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPriceAuditSink;

impl PriceAuditSink for TracingPriceAuditSink {
    fn record(&self, entry: PriceAuditEntry) -> Result<(), SinkError> {
        info!(
            tenant = %entry.tenant_id,
            item_id = %entry.item_id,
            rule_id = ?entry.rule_id.map(|id| id.to_string()),
            previous = ?entry.previous_price,
            new = %entry.new_price,
            applied = entry.applied,
            reason = %entry.reason,
            "price change audited"
        );
        Ok(())
    }
}
