//! Dispatch of rule actions against one item.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use stockpilot_alerts::{AlertId, AlertPriority, AlertType, NewAlert, Notification};
use stockpilot_core::{Clock, DomainError, DomainResult};
use stockpilot_inventory::{InventoryItem, MovementId, MovementType};
use stockpilot_rules::{
    Action, AutomationRule, NotificationSpec, PriceFormula, StockUpdateMode, percentage_change,
};

use crate::alert_engine::AlertEngine;
use crate::ledger::{StockAdjustment, StockLedger};
use crate::sinks::{NotificationSink, PriceAuditEntry, PriceAuditSink};

/// What one action did to one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    PriceUpdated {
        previous: Option<Decimal>,
        new: Decimal,
    },
    /// Formula evaluated but the change was below the threshold (or zero).
    PriceUnchanged {
        proposed: Decimal,
    },
    ReorderRaised {
        alert_id: AlertId,
        quantity: i64,
    },
    StockUpdated {
        movement_id: Option<MovementId>,
        new_level: i64,
    },
    AlertRaised {
        alert_id: AlertId,
    },
    Notified {
        delivered: bool,
    },
}

/// Runs actions through the ledger, the alert engine and the outbound sinks.
pub struct ActionExecutor {
    ledger: Arc<StockLedger>,
    alerts: Arc<AlertEngine>,
    notifier: Arc<dyn NotificationSink>,
    price_audit: Arc<dyn PriceAuditSink>,
    clock: Arc<dyn Clock>,
}

impl ActionExecutor {
    pub fn new(
        ledger: Arc<StockLedger>,
        alerts: Arc<AlertEngine>,
        notifier: Arc<dyn NotificationSink>,
        price_audit: Arc<dyn PriceAuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            alerts,
            notifier,
            price_audit,
            clock,
        }
    }

    /// Run `action` for `item`. `data` is the condition data used for templates.
    pub fn execute(
        &self,
        rule: &AutomationRule,
        item: &InventoryItem,
        action: &Action,
        data: &Value,
    ) -> DomainResult<ActionOutcome> {
        debug!(rule_id = %rule.id_typed(), item_id = %item.id_typed(), action = action.kind(), "running action");
        match action {
            Action::UpdatePrice {
                formula,
                min_change_percent,
            } => self.update_price(rule, item, formula, *min_change_percent),
            Action::CreateReorder { quantity, priority } => self.create_reorder(rule, item, *quantity, *priority),
            Action::UpdateStock { mode, quantity, reason } => {
                self.update_stock(rule, item, *mode, *quantity, reason.as_deref())
            }
            Action::CreateAlert { priority, message } => self.create_alert(rule, item, *priority, message, data),
            Action::SendNotification(spec) => Ok(ActionOutcome::Notified {
                delivered: self.send_notification(rule, spec, data),
            }),
        }
    }

    /// Deliver a notification. Failures are logged and reported as undelivered.
    pub fn send_notification(&self, rule: &AutomationRule, spec: &NotificationSpec, data: &Value) -> bool {
        let notification = Notification {
            tenant_id: rule.tenant_id(),
            channels: spec.channels.clone(),
            recipients: spec.recipients.clone(),
            subject: spec.render_subject(data),
            body: spec.render_message(data),
            priority: spec.priority,
            alert_id: None,
        };
        match self.notifier.send(&notification) {
            Ok(()) => true,
            Err(e) => {
                warn!(rule_id = %rule.id_typed(), error = %e, "rule notification failed");
                false
            }
        }
    }

    fn update_price(
        &self,
        rule: &AutomationRule,
        item: &InventoryItem,
        formula: &PriceFormula,
        min_change_percent: Decimal,
    ) -> DomainResult<ActionOutcome> {
        let tenant_id = rule.tenant_id();
        let previous = item.price();
        let proposed = formula.apply(previous, item.unit_cost())?;
        let change = previous.and_then(|p| percentage_change(p, proposed));

        // An item without a price (or priced at zero) takes any new price.
        let (applied, reason) = match (previous, change) {
            (Some(p), _) if p == proposed => (false, "price unchanged".to_string()),
            (Some(_), Some(c)) if c < min_change_percent => (
                false,
                format!("change {c}% below threshold {min_change_percent}%"),
            ),
            _ => (true, format!("rule {}", rule.name())),
        };

        if applied {
            self.ledger.set_price(tenant_id, item.id_typed(), proposed)?;
        }

        let entry = PriceAuditEntry {
            tenant_id,
            item_id: item.id_typed(),
            rule_id: Some(rule.id_typed()),
            previous_price: previous,
            new_price: proposed,
            change_percent: change,
            applied,
            reason,
            recorded_at: self.clock.now(),
        };
        if let Err(e) = self.price_audit.record(entry) {
            warn!(rule_id = %rule.id_typed(), item_id = %item.id_typed(), error = %e, "price audit write failed");
        }

        Ok(if applied {
            ActionOutcome::PriceUpdated { previous, new: proposed }
        } else {
            ActionOutcome::PriceUnchanged { proposed }
        })
    }

    fn create_reorder(
        &self,
        rule: &AutomationRule,
        item: &InventoryItem,
        quantity: Option<i64>,
        priority: AlertPriority,
    ) -> DomainResult<ActionOutcome> {
        let quantity = quantity.unwrap_or_else(|| {
            item.thresholds()
                .recommended_reorder_quantity(item.stock_level())
        });

        let mut details = Map::new();
        details.insert("recommendedQuantity".to_string(), json!(quantity));
        details.insert("currentStock".to_string(), json!(item.stock_level()));
        details.insert("availableStock".to_string(), json!(item.available_stock()));
        details.insert("ruleId".to_string(), json!(rule.id_typed().to_string()));

        let alert = self.alerts.create_alert(NewAlert {
            tenant_id: rule.tenant_id(),
            item_id: item.id_typed(),
            alert_type: AlertType::ReorderNeeded,
            priority,
            message: format!("Reorder {quantity} units of {}", item.sku()),
            details,
            notification_settings: None,
            created_by: rule_actor(rule),
        })?;

        Ok(ActionOutcome::ReorderRaised {
            alert_id: alert.id_typed(),
            quantity,
        })
    }

    fn update_stock(
        &self,
        rule: &AutomationRule,
        item: &InventoryItem,
        mode: StockUpdateMode,
        quantity: i64,
        reason: Option<&str>,
    ) -> DomainResult<ActionOutcome> {
        let tenant_id = rule.tenant_id();
        let reason = reason
            .map(str::to_string)
            .unwrap_or_else(|| format!("automation rule {}", rule.name()));

        let update = match mode {
            StockUpdateMode::Set => self.ledger.update_stock_level(tenant_id, item.id_typed(), quantity, &reason)?,
            StockUpdateMode::Increase | StockUpdateMode::Decrease => {
                let delta = if mode == StockUpdateMode::Increase { quantity } else { -quantity };
                if item.stock_level() + delta < 0 {
                    return Err(DomainError::execution(format!(
                        "decrease of {quantity} would take {} below zero",
                        item.sku()
                    )));
                }
                self.ledger.adjust_stock(
                    tenant_id,
                    item.id_typed(),
                    StockAdjustment {
                        delta,
                        movement_type: MovementType::Adjustment,
                        reason,
                        unit_cost: None,
                        reference: Some(rule_actor(rule)),
                    },
                )?
            }
        };

        Ok(ActionOutcome::StockUpdated {
            movement_id: update.movement.as_ref().map(|m| m.id()),
            new_level: update.item.stock_level(),
        })
    }

    fn create_alert(
        &self,
        rule: &AutomationRule,
        item: &InventoryItem,
        priority: AlertPriority,
        message: &str,
        data: &Value,
    ) -> DomainResult<ActionOutcome> {
        let mut details = Map::new();
        details.insert("ruleId".to_string(), json!(rule.id_typed().to_string()));
        details.insert("ruleName".to_string(), json!(rule.name()));

        let alert = self.alerts.create_alert(NewAlert {
            tenant_id: rule.tenant_id(),
            item_id: item.id_typed(),
            alert_type: AlertType::Custom,
            priority,
            message: stockpilot_rules::render(message, data),
            details,
            notification_settings: None,
            created_by: rule_actor(rule),
        })?;
        Ok(ActionOutcome::AlertRaised {
            alert_id: alert.id_typed(),
        })
    }
}

fn rule_actor(rule: &AutomationRule) -> String {
    format!("rule:{}", rule.id_typed())
}
