//! Stock threshold settings and the predicates derived from them.
//!
//! Every low-stock / reorder / overstock decision in the system goes through
//! [`StockThresholds`]: the item's derived status, the alert threshold check and
//! rule-engine filters all read the same predicates.

use serde::{Deserialize, Serialize};

use stockpilot_core::{DomainError, DomainResult};

/// Derived stock status of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::LowStock => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }
}

/// Overstock is reported once stock exceeds `maximum_stock * 6 / 5` (120%).
const OVERSTOCK_NUMERATOR: i64 = 6;
const OVERSTOCK_DENOMINATOR: i64 = 5;

/// Per-item stock settings.
///
/// Invariants (checked by [`StockThresholds::validate`]):
/// - `0 <= minimum_stock < maximum_stock`
/// - `0 <= reorder_point <= maximum_stock`
/// - `reorder_quantity >= 0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockThresholds {
    pub minimum_stock: i64,
    pub maximum_stock: i64,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub auto_reorder: bool,
}

impl Default for StockThresholds {
    fn default() -> Self {
        Self {
            minimum_stock: 0,
            maximum_stock: 1_000,
            reorder_point: 0,
            reorder_quantity: 0,
            auto_reorder: false,
        }
    }
}

impl StockThresholds {
    pub fn validate(&self) -> DomainResult<()> {
        if self.minimum_stock < 0 {
            return Err(DomainError::validation("minimum_stock cannot be negative"));
        }
        if self.minimum_stock >= self.maximum_stock {
            return Err(DomainError::validation(
                "minimum_stock must be lower than maximum_stock",
            ));
        }
        if self.reorder_point < 0 {
            return Err(DomainError::validation("reorder_point cannot be negative"));
        }
        if self.reorder_point > self.maximum_stock {
            return Err(DomainError::validation(
                "reorder_point cannot exceed maximum_stock",
            ));
        }
        if self.reorder_quantity < 0 {
            return Err(DomainError::validation("reorder_quantity cannot be negative"));
        }
        Ok(())
    }

    /// Level at or below which an item counts as low on stock.
    pub fn low_stock_threshold(&self) -> i64 {
        self.minimum_stock.max(self.reorder_point)
    }

    pub fn status_for(&self, stock_level: i64) -> StockStatus {
        if stock_level <= 0 {
            StockStatus::OutOfStock
        } else if stock_level <= self.low_stock_threshold() {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }

    /// At or below the hard minimum (more urgent than merely low).
    pub fn is_below_minimum(&self, stock_level: i64) -> bool {
        stock_level <= self.minimum_stock
    }

    pub fn needs_reorder(&self, available_stock: i64) -> bool {
        self.auto_reorder && available_stock <= self.reorder_point
    }

    pub fn is_overstocked(&self, stock_level: i64) -> bool {
        stock_level * OVERSTOCK_DENOMINATOR > self.maximum_stock * OVERSTOCK_NUMERATOR
    }

    /// Quantity to suggest when a reorder is raised.
    ///
    /// Uses the configured reorder quantity; without one, fills up to `maximum_stock`.
    pub fn recommended_reorder_quantity(&self, stock_level: i64) -> i64 {
        if self.reorder_quantity > 0 {
            self.reorder_quantity
        } else {
            (self.maximum_stock - stock_level).max(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> StockThresholds {
        StockThresholds {
            minimum_stock: 10,
            maximum_stock: 200,
            reorder_point: 20,
            reorder_quantity: 50,
            auto_reorder: true,
        }
    }

    #[test]
    fn status_uses_the_higher_of_minimum_and_reorder_point() {
        let t = thresholds();
        assert_eq!(t.status_for(0), StockStatus::OutOfStock);
        assert_eq!(t.status_for(-3), StockStatus::OutOfStock);
        assert_eq!(t.status_for(15), StockStatus::LowStock);
        assert_eq!(t.status_for(20), StockStatus::LowStock);
        assert_eq!(t.status_for(21), StockStatus::InStock);
    }

    #[test]
    fn minimum_governs_when_reorder_point_is_lower() {
        let t = StockThresholds {
            reorder_point: 5,
            ..thresholds()
        };
        assert_eq!(t.status_for(10), StockStatus::LowStock);
        assert_eq!(t.status_for(11), StockStatus::InStock);
    }

    #[test]
    fn reorder_requires_auto_reorder() {
        let t = thresholds();
        assert!(t.needs_reorder(20));
        assert!(!t.needs_reorder(21));

        let manual = StockThresholds {
            auto_reorder: false,
            ..t
        };
        assert!(!manual.needs_reorder(0));
    }

    #[test]
    fn overstock_starts_above_120_percent() {
        let t = thresholds();
        assert!(!t.is_overstocked(240));
        assert!(t.is_overstocked(241));
    }

    #[test]
    fn validation_rejects_inverted_bounds() {
        let bad = StockThresholds {
            minimum_stock: 50,
            maximum_stock: 50,
            ..thresholds()
        };
        assert!(matches!(bad.validate(), Err(DomainError::Validation(_))));

        let bad_reorder = StockThresholds {
            reorder_point: 500,
            ..thresholds()
        };
        assert!(bad_reorder.validate().is_err());
        assert!(thresholds().validate().is_ok());
    }

    #[test]
    fn recommended_quantity_falls_back_to_fill_up() {
        let t = StockThresholds {
            reorder_quantity: 0,
            ..thresholds()
        };
        assert_eq!(t.recommended_reorder_quantity(15), 185);
        assert_eq!(thresholds().recommended_reorder_quantity(15), 50);
    }
}
