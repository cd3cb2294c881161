//! Domain events that can trigger realtime rules.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use stockpilot_inventory::InventoryItemId;

use crate::rule::RuleType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    StockChanged,
    PriceChanged,
    SupplierUpdated,
    OrderCreated,
}

impl TriggerKind {
    /// Rule types an event of this kind may run.
    pub fn eligible_rule_types(self) -> &'static [RuleType] {
        match self {
            TriggerKind::StockChanged => &[
                RuleType::Reorder,
                RuleType::StockAlert,
                RuleType::InventoryBalance,
            ],
            TriggerKind::PriceChanged => &[RuleType::PriceAdjustment],
            TriggerKind::SupplierUpdated => &[RuleType::SupplierSwitch, RuleType::Reorder],
            TriggerKind::OrderCreated => &[RuleType::Reorder, RuleType::StockAlert],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::StockChanged => "stock_changed",
            TriggerKind::PriceChanged => "price_changed",
            TriggerKind::SupplierUpdated => "supplier_updated",
            TriggerKind::OrderCreated => "order_created",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: InventoryItemId,
    pub quantity: i64,
}

/// An external fact the rule engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TriggerEvent {
    StockChanged {
        item_id: InventoryItemId,
        previous_stock: i64,
        new_stock: i64,
    },
    PriceChanged {
        item_id: InventoryItemId,
        previous_price: Option<Decimal>,
        new_price: Decimal,
    },
    SupplierUpdated {
        supplier_id: String,
    },
    OrderCreated {
        order_id: String,
        lines: Vec<OrderLine>,
    },
}

impl TriggerEvent {
    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerEvent::StockChanged { .. } => TriggerKind::StockChanged,
            TriggerEvent::PriceChanged { .. } => TriggerKind::PriceChanged,
            TriggerEvent::SupplierUpdated { .. } => TriggerKind::SupplierUpdated,
            TriggerEvent::OrderCreated { .. } => TriggerKind::OrderCreated,
        }
    }

    /// Items named by the event. Supplier updates name none; the engine resolves
    /// them from the supplier id.
    pub fn item_ids(&self) -> Vec<InventoryItemId> {
        match self {
            TriggerEvent::StockChanged { item_id, .. } | TriggerEvent::PriceChanged { item_id, .. } => {
                vec![*item_id]
            }
            TriggerEvent::SupplierUpdated { .. } => Vec::new(),
            TriggerEvent::OrderCreated { lines, .. } => {
                let mut ids: Vec<_> = lines.iter().map(|l| l.item_id).collect();
                ids.sort();
                ids.dedup();
                ids
            }
        }
    }

    pub fn supplier_id(&self) -> Option<&str> {
        match self {
            TriggerEvent::SupplierUpdated { supplier_id } => Some(supplier_id.as_str()),
            _ => None,
        }
    }

    /// Payload exposed to conditions under the `event` key, camelCased.
    pub fn payload(&self) -> Value {
        match self {
            TriggerEvent::StockChanged {
                previous_stock,
                new_stock,
                ..
            } => json!({
                "type": self.kind().as_str(),
                "previousStock": previous_stock,
                "newStock": new_stock,
                "change": new_stock - previous_stock,
            }),
            TriggerEvent::PriceChanged {
                previous_price,
                new_price,
                ..
            } => json!({
                "type": self.kind().as_str(),
                "previousPrice": previous_price.map(|p| p.to_string()),
                "newPrice": new_price.to_string(),
            }),
            TriggerEvent::SupplierUpdated { supplier_id } => json!({
                "type": self.kind().as_str(),
                "supplierId": supplier_id,
            }),
            TriggerEvent::OrderCreated { order_id, lines } => json!({
                "type": self.kind().as_str(),
                "orderId": order_id,
                "lineCount": lines.len(),
                "totalQuantity": lines.iter().map(|l| l.quantity).sum::<i64>(),
            }),
        }
    }
}
