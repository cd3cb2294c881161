//! Immutable stock movements (the ledger's append-only history).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockpilot_core::{DomainError, DomainResult, TenantId, typed_id};

use crate::item::InventoryItemId;

typed_id!(
    /// Stock movement identifier.
    MovementId
);

/// Cause of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Purchase,
    Sale,
    Adjustment,
    Reservation,
    Release,
    Return,
    TransferIn,
    TransferOut,
    Damaged,
    Lost,
    ManualCorrection,
}

impl MovementType {
    /// Type recorded on the entry that reverses a movement of this type.
    pub fn reversal(self) -> MovementType {
        match self {
            MovementType::Purchase => MovementType::Return,
            MovementType::Return => MovementType::Purchase,
            MovementType::TransferIn => MovementType::TransferOut,
            MovementType::TransferOut => MovementType::TransferIn,
            MovementType::Reservation => MovementType::Release,
            MovementType::Release => MovementType::Reservation,
            _ => MovementType::ManualCorrection,
        }
    }

    /// Whether a fresh movement of this type may later be reversed.
    pub fn reversible_by_default(self) -> bool {
        !matches!(self, MovementType::ManualCorrection)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Purchase => "purchase",
            MovementType::Sale => "sale",
            MovementType::Adjustment => "adjustment",
            MovementType::Reservation => "reservation",
            MovementType::Release => "release",
            MovementType::Return => "return",
            MovementType::TransferIn => "transfer_in",
            MovementType::TransferOut => "transfer_out",
            MovementType::Damaged => "damaged",
            MovementType::Lost => "lost",
            MovementType::ManualCorrection => "manual_correction",
        }
    }
}

/// One ledger entry.
///
/// `quantity` is the signed change to the stock level and `reserved_delta` the signed
/// change to reserved stock (reservations move reserved stock without touching the level).
///
/// Fields are read-only outside this crate; the only permitted mutation after creation
/// is [`StockMovement::mark_reversed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub(crate) id: MovementId,
    pub(crate) tenant_id: TenantId,
    pub(crate) item_id: InventoryItemId,
    pub(crate) movement_type: MovementType,
    pub(crate) quantity: i64,
    pub(crate) reserved_delta: i64,
    pub(crate) previous_stock: i64,
    pub(crate) new_stock: i64,
    pub(crate) unit_cost: Option<Decimal>,
    pub(crate) reason: String,
    pub(crate) reference: Option<String>,
    pub(crate) is_reversible: bool,
    pub(crate) is_reversed: bool,
    pub(crate) reversed_by: Option<MovementId>,
    pub(crate) reverses: Option<MovementId>,
    pub(crate) created_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn id(&self) -> MovementId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn item_id(&self) -> InventoryItemId {
        self.item_id
    }

    pub fn movement_type(&self) -> MovementType {
        self.movement_type
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn reserved_delta(&self) -> i64 {
        self.reserved_delta
    }

    pub fn previous_stock(&self) -> i64 {
        self.previous_stock
    }

    pub fn new_stock(&self) -> i64 {
        self.new_stock
    }

    pub fn unit_cost(&self) -> Option<Decimal> {
        self.unit_cost
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn is_reversible(&self) -> bool {
        self.is_reversible
    }

    pub fn is_reversed(&self) -> bool {
        self.is_reversed
    }

    pub fn reversed_by(&self) -> Option<MovementId> {
        self.reversed_by
    }

    pub fn reverses(&self) -> Option<MovementId> {
        self.reverses
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `new_stock = previous_stock + quantity` and `new_stock >= 0`.
    pub fn is_consistent(&self) -> bool {
        self.new_stock == self.previous_stock + self.quantity && self.new_stock >= 0
    }

    /// Ensure the movement can be reversed right now.
    pub fn ensure_reversible(&self) -> DomainResult<()> {
        if !self.is_reversible {
            return Err(DomainError::validation(format!(
                "movement {} ({}) is not reversible",
                self.id,
                self.movement_type.as_str()
            )));
        }
        if self.is_reversed {
            return Err(DomainError::conflict(format!(
                "movement {} is already reversed",
                self.id
            )));
        }
        Ok(())
    }

    /// Link this movement to the entry that reversed it.
    pub fn mark_reversed(&mut self, reversal_id: MovementId) -> DomainResult<()> {
        self.ensure_reversible()?;
        self.is_reversed = true;
        self.reversed_by = Some(reversal_id);
        Ok(())
    }
}
