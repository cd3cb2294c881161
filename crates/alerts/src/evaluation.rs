//! Threshold evaluation: which alerts an item's current numbers call for.

use serde_json::{Map, Value, json};

use stockpilot_inventory::{InventoryItem, StockStatus};

use crate::alert::{AlertPriority, AlertType};

/// An alert the threshold check wants raised (or merged into an open one).
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub message: String,
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ThresholdAssessment {
    pub raised: Vec<AlertCandidate>,
    /// Threshold types whose condition no longer holds.
    pub cleared: Vec<AlertType>,
}

/// Evaluate every threshold predicate against `item`.
///
/// Inactive items raise nothing and clear everything.
pub fn evaluate_thresholds(item: &InventoryItem) -> ThresholdAssessment {
    let mut raised = Vec::new();

    if item.is_active() {
        let t = item.thresholds();
        let stock = item.stock_level();
        let label = format!("{} ({})", item.name(), item.sku());

        match item.stock_status() {
            StockStatus::OutOfStock => raised.push(candidate(
                AlertType::OutOfStock,
                AlertPriority::Critical,
                format!("{label} is out of stock"),
                item,
                json!({}),
            )),
            StockStatus::LowStock => {
                let priority = if t.is_below_minimum(stock) {
                    AlertPriority::High
                } else {
                    AlertPriority::Medium
                };
                raised.push(candidate(
                    AlertType::LowStock,
                    priority,
                    format!("{label} is low on stock ({stock} left)"),
                    item,
                    json!({ "lowStockThreshold": t.low_stock_threshold() }),
                ));
            }
            StockStatus::InStock => {}
        }

        if t.needs_reorder(item.available_stock()) {
            let quantity = t.recommended_reorder_quantity(stock);
            raised.push(candidate(
                AlertType::ReorderNeeded,
                AlertPriority::Medium,
                format!("{label} needs reordering (suggested quantity {quantity})"),
                item,
                json!({ "recommendedQuantity": quantity }),
            ));
        }

        if t.is_overstocked(stock) {
            raised.push(candidate(
                AlertType::Overstock,
                AlertPriority::Low,
                format!("{label} is overstocked ({stock} on hand)"),
                item,
                json!({}),
            ));
        }
    }

    let cleared = AlertType::THRESHOLD
        .into_iter()
        .filter(|ty| !raised.iter().any(|c| c.alert_type == *ty))
        .collect();

    ThresholdAssessment { raised, cleared }
}

fn candidate(
    alert_type: AlertType,
    priority: AlertPriority,
    message: String,
    item: &InventoryItem,
    extra: Value,
) -> AlertCandidate {
    let mut details = Map::new();
    details.insert("stockLevel".to_string(), json!(item.stock_level()));
    details.insert("availableStock".to_string(), json!(item.available_stock()));
    details.insert("minimumStock".to_string(), json!(item.thresholds().minimum_stock));
    details.insert("maximumStock".to_string(), json!(item.thresholds().maximum_stock));
    details.insert("reorderPoint".to_string(), json!(item.thresholds().reorder_point));
    if let Value::Object(extra) = extra {
        details.extend(extra);
    }

    AlertCandidate {
        alert_type,
        priority,
        message,
        details,
    }
}
