//! Inventory domain module (event-sourced).
//!
//! Stock levels, reservations and the immutable movement ledger, implemented purely
//! as deterministic domain logic (no IO, no storage). Thresholds drive the derived
//! stock status that alerting and automation rules read.

pub mod item;
pub mod movement;
pub mod thresholds;

pub use item::{
    AdjustStock, DeactivateItem, InventoryCommand, InventoryEvent, InventoryItem,
    InventoryItemId, ItemDeactivated, ItemRegistered, ItemSnapshot, PriceChanged, RegisterItem,
    ReleaseStock, ReserveStock, ReverseMovement, SetPrice, SetStockLevel, StockMoved,
    ThresholdsUpdated, UpdateThresholds,
};
pub use movement::{MovementId, MovementType, StockMovement};
pub use thresholds::{StockStatus, StockThresholds};
