use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use stockpilot_core::{Aggregate, AggregateRoot, DomainError, TenantId, typed_id};
use stockpilot_events::Event;

use crate::movement::{MovementId, MovementType, StockMovement};
use crate::thresholds::{StockStatus, StockThresholds};

typed_id!(
    /// Inventory item identifier (tenant-scoped via `tenant_id` fields in events/commands).
    InventoryItemId
);

/// Aggregate root: InventoryItem.
///
/// Holds stock numbers plus the catalog attributes automation rules filter on.
/// Invariants: `0 <= reserved_stock <= stock_level`, thresholds valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    id: InventoryItemId,
    tenant_id: Option<TenantId>,
    sku: String,
    name: String,
    category: Option<String>,
    supplier_id: Option<String>,
    price: Option<Decimal>,
    unit_cost: Option<Decimal>,
    stock_level: i64,
    reserved_stock: i64,
    thresholds: StockThresholds,
    active: bool,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl InventoryItem {
    /// Create an empty, not-yet-registered aggregate instance.
    pub fn empty(id: InventoryItemId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            name: String::new(),
            category: None,
            supplier_id: None,
            price: None,
            unit_cost: None,
            stock_level: 0,
            reserved_stock: 0,
            thresholds: StockThresholds::default(),
            active: false,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn supplier_id(&self) -> Option<&str> {
        self.supplier_id.as_deref()
    }

    pub fn price(&self) -> Option<Decimal> {
        self.price
    }

    pub fn unit_cost(&self) -> Option<Decimal> {
        self.unit_cost
    }

    pub fn stock_level(&self) -> i64 {
        self.stock_level
    }

    pub fn reserved_stock(&self) -> i64 {
        self.reserved_stock
    }

    pub fn available_stock(&self) -> i64 {
        (self.stock_level - self.reserved_stock).max(0)
    }

    pub fn thresholds(&self) -> &StockThresholds {
        &self.thresholds
    }

    pub fn stock_status(&self) -> StockStatus {
        self.thresholds.status_for(self.stock_level)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn can_reserve(&self, quantity: i64) -> bool {
        quantity > 0 && self.available_stock() >= quantity
    }

    /// Flat view used for rule condition evaluation (camelCase field paths).
    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id.to_string(),
            sku: self.sku.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
            supplier_id: self.supplier_id.clone(),
            price: self.price.and_then(|p| p.to_f64()),
            unit_cost: self.unit_cost.and_then(|c| c.to_f64()),
            stock_level: self.stock_level,
            reserved_stock: self.reserved_stock,
            available_stock: self.available_stock(),
            minimum_stock: self.thresholds.minimum_stock,
            maximum_stock: self.thresholds.maximum_stock,
            reorder_point: self.thresholds.reorder_point,
            reorder_quantity: self.thresholds.reorder_quantity,
            auto_reorder: self.thresholds.auto_reorder,
            stock_status: self.stock_status(),
            is_active: self.active,
        }
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Serializable item view that rule conditions address by field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSnapshot {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub supplier_id: Option<String>,
    pub price: Option<f64>,
    pub unit_cost: Option<f64>,
    pub stock_level: i64,
    pub reserved_stock: i64,
    pub available_stock: i64,
    pub minimum_stock: i64,
    pub maximum_stock: i64,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub auto_reorder: bool,
    pub stock_status: StockStatus,
    pub is_active: bool,
}

/// Command: RegisterItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub supplier_id: Option<String>,
    pub price: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
    pub thresholds: StockThresholds,
    /// Opening balance, recorded as an adjustment movement when positive.
    pub initial_stock: i64,
    pub initial_movement_id: MovementId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetStockLevel (absolute count, e.g. a stock take or manual correction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStockLevel {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub movement_id: MovementId,
    pub new_level: i64,
    pub movement_type: MovementType,
    pub reason: String,
    pub unit_cost: Option<Decimal>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock (relative change, e.g. a sale or a goods receipt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub movement_id: MovementId,
    pub delta: i64,
    pub movement_type: MovementType,
    pub reason: String,
    pub unit_cost: Option<Decimal>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub movement_id: MovementId,
    pub quantity: i64,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub movement_id: MovementId,
    pub quantity: i64,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReverseMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseMovement {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub movement_id: MovementId,
    pub original: StockMovement,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetPrice (catalog update; no stock movement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPrice {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateThresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateThresholds {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub thresholds: StockThresholds,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateItem (soft retirement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateItem {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    RegisterItem(RegisterItem),
    SetStockLevel(SetStockLevel),
    AdjustStock(AdjustStock),
    ReserveStock(ReserveStock),
    ReleaseStock(ReleaseStock),
    ReverseMovement(ReverseMovement),
    SetPrice(SetPrice),
    UpdateThresholds(UpdateThresholds),
    DeactivateItem(DeactivateItem),
}

/// Event: ItemRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistered {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub supplier_id: Option<String>,
    pub price: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
    pub thresholds: StockThresholds,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMoved. Carries the full ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoved {
    pub movement: StockMovement,
}

/// Event: PriceChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChanged {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub previous_price: Option<Decimal>,
    pub new_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ThresholdsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdsUpdated {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub thresholds: StockThresholds,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDeactivated {
    pub tenant_id: TenantId,
    pub item_id: InventoryItemId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemRegistered(ItemRegistered),
    StockMoved(StockMoved),
    PriceChanged(PriceChanged),
    ThresholdsUpdated(ThresholdsUpdated),
    ItemDeactivated(ItemDeactivated),
}

impl InventoryEvent {
    /// The ledger entry carried by this event, if any.
    pub fn movement(&self) -> Option<&StockMovement> {
        match self {
            InventoryEvent::StockMoved(e) => Some(&e.movement),
            _ => None,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemRegistered(_) => "inventory.item.registered",
            InventoryEvent::StockMoved(_) => "inventory.item.stock_moved",
            InventoryEvent::PriceChanged(_) => "inventory.item.price_changed",
            InventoryEvent::ThresholdsUpdated(_) => "inventory.item.thresholds_updated",
            InventoryEvent::ItemDeactivated(_) => "inventory.item.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemRegistered(e) => e.occurred_at,
            InventoryEvent::StockMoved(e) => e.movement.created_at,
            InventoryEvent::PriceChanged(e) => e.occurred_at,
            InventoryEvent::ThresholdsUpdated(e) => e.occurred_at,
            InventoryEvent::ItemDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemRegistered(e) => {
                self.id = e.item_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.supplier_id = e.supplier_id.clone();
                self.price = e.price;
                self.unit_cost = e.unit_cost;
                self.thresholds = e.thresholds;
                self.stock_level = 0;
                self.reserved_stock = 0;
                self.active = true;
                self.created = true;
                self.updated_at = Some(e.occurred_at);
            }
            InventoryEvent::StockMoved(e) => {
                self.stock_level = e.movement.new_stock;
                self.reserved_stock += e.movement.reserved_delta;
                if let Some(cost) = e.movement.unit_cost {
                    self.unit_cost = Some(cost);
                }
                self.updated_at = Some(e.movement.created_at);
            }
            InventoryEvent::PriceChanged(e) => {
                self.price = Some(e.new_price);
                self.updated_at = Some(e.occurred_at);
            }
            InventoryEvent::ThresholdsUpdated(e) => {
                self.thresholds = e.thresholds;
                self.updated_at = Some(e.occurred_at);
            }
            InventoryEvent::ItemDeactivated(e) => {
                self.active = false;
                self.updated_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::RegisterItem(cmd) => self.handle_register(cmd),
            InventoryCommand::SetStockLevel(cmd) => self.handle_set_level(cmd),
            InventoryCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            InventoryCommand::ReserveStock(cmd) => self.handle_reserve(cmd),
            InventoryCommand::ReleaseStock(cmd) => self.handle_release(cmd),
            InventoryCommand::ReverseMovement(cmd) => self.handle_reverse(cmd),
            InventoryCommand::SetPrice(cmd) => self.handle_set_price(cmd),
            InventoryCommand::UpdateThresholds(cmd) => self.handle_thresholds(cmd),
            InventoryCommand::DeactivateItem(cmd) => self.handle_deactivate(cmd),
        }
    }
}

/// Fields shared by every movement the aggregate records.
struct MovementDraft<'a> {
    tenant_id: TenantId,
    movement_id: MovementId,
    movement_type: MovementType,
    quantity: i64,
    reserved_delta: i64,
    unit_cost: Option<Decimal>,
    reason: &'a str,
    reference: Option<&'a str>,
    reverses: Option<MovementId>,
    occurred_at: DateTime<Utc>,
}

impl InventoryItem {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_item_id(&self, item_id: InventoryItemId) -> Result<(), DomainError> {
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    /// Registered, same tenant, same item, still active.
    fn ensure_mutable(&self, tenant_id: TenantId, item_id: InventoryItemId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("inventory item {item_id}")));
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_item_id(item_id)?;
        if !self.active {
            return Err(DomainError::invariant(format!("item {item_id} is deactivated")));
        }
        Ok(())
    }

    fn movement(&self, draft: MovementDraft<'_>) -> Result<InventoryEvent, DomainError> {
        let new_stock = self.stock_level + draft.quantity;
        if new_stock < 0 {
            return Err(DomainError::invariant("stock cannot go negative"));
        }
        let new_reserved = self.reserved_stock + draft.reserved_delta;
        if new_reserved < 0 || new_reserved > new_stock {
            return Err(DomainError::invariant(
                "reserved stock must stay between zero and the stock level",
            ));
        }

        let is_reversible = draft.reverses.is_none() && draft.movement_type.reversible_by_default();

        Ok(InventoryEvent::StockMoved(StockMoved {
            movement: StockMovement {
                id: draft.movement_id,
                tenant_id: draft.tenant_id,
                item_id: self.id,
                movement_type: draft.movement_type,
                quantity: draft.quantity,
                reserved_delta: draft.reserved_delta,
                previous_stock: self.stock_level,
                new_stock,
                unit_cost: draft.unit_cost,
                reason: draft.reason.to_string(),
                reference: draft.reference.map(str::to_string),
                is_reversible,
                is_reversed: false,
                reversed_by: None,
                reverses: draft.reverses,
                created_at: draft.occurred_at,
            },
        }))
    }

    /// Reservations that a new stock level can no longer cover are released.
    fn reserved_delta_for_level(&self, new_level: i64) -> i64 {
        if self.reserved_stock > new_level {
            new_level.max(0) - self.reserved_stock
        } else {
            0
        }
    }

    fn handle_register(&self, cmd: &RegisterItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if cmd.initial_stock < 0 {
            return Err(DomainError::validation("initial stock cannot be negative"));
        }
        if cmd.price.is_some_and(|p| p.is_sign_negative()) {
            return Err(DomainError::validation("price cannot be negative"));
        }
        cmd.thresholds.validate()?;

        let mut events = vec![InventoryEvent::ItemRegistered(ItemRegistered {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            sku: cmd.sku.clone(),
            name: cmd.name.clone(),
            category: cmd.category.clone(),
            supplier_id: cmd.supplier_id.clone(),
            price: cmd.price,
            unit_cost: cmd.unit_cost,
            thresholds: cmd.thresholds,
            occurred_at: cmd.occurred_at,
        })];

        if cmd.initial_stock > 0 {
            // Opening balance starts from an empty item with the new id.
            let mut registered = InventoryItem::empty(cmd.item_id);
            registered.apply(&events[0]);
            events.push(registered.movement(MovementDraft {
                tenant_id: cmd.tenant_id,
                movement_id: cmd.initial_movement_id,
                movement_type: MovementType::Adjustment,
                quantity: cmd.initial_stock,
                reserved_delta: 0,
                unit_cost: cmd.unit_cost,
                reason: "opening balance",
                reference: None,
                reverses: None,
                occurred_at: cmd.occurred_at,
            })?);
        }

        Ok(events)
    }

    fn handle_set_level(&self, cmd: &SetStockLevel) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_mutable(cmd.tenant_id, cmd.item_id)?;
        if cmd.new_level < 0 {
            return Err(DomainError::validation("stock level cannot be negative"));
        }

        Ok(vec![self.movement(MovementDraft {
            tenant_id: cmd.tenant_id,
            movement_id: cmd.movement_id,
            movement_type: cmd.movement_type,
            quantity: cmd.new_level - self.stock_level,
            reserved_delta: self.reserved_delta_for_level(cmd.new_level),
            unit_cost: cmd.unit_cost,
            reason: &cmd.reason,
            reference: cmd.reference.as_deref(),
            reverses: None,
            occurred_at: cmd.occurred_at,
        })?])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_mutable(cmd.tenant_id, cmd.item_id)?;
        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        let new_level = self.stock_level + cmd.delta;

        Ok(vec![self.movement(MovementDraft {
            tenant_id: cmd.tenant_id,
            movement_id: cmd.movement_id,
            movement_type: cmd.movement_type,
            quantity: cmd.delta,
            reserved_delta: self.reserved_delta_for_level(new_level),
            unit_cost: cmd.unit_cost,
            reason: &cmd.reason,
            reference: cmd.reference.as_deref(),
            reverses: None,
            occurred_at: cmd.occurred_at,
        })?])
    }

    fn handle_reserve(&self, cmd: &ReserveStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_mutable(cmd.tenant_id, cmd.item_id)?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("reservation quantity must be positive"));
        }
        if !self.can_reserve(cmd.quantity) {
            return Err(DomainError::invariant(format!(
                "insufficient available stock (available: {}, requested: {})",
                self.available_stock(),
                cmd.quantity
            )));
        }

        Ok(vec![self.movement(MovementDraft {
            tenant_id: cmd.tenant_id,
            movement_id: cmd.movement_id,
            movement_type: MovementType::Reservation,
            quantity: 0,
            reserved_delta: cmd.quantity,
            unit_cost: None,
            reason: "stock reserved",
            reference: cmd.reference.as_deref(),
            reverses: None,
            occurred_at: cmd.occurred_at,
        })?])
    }

    fn handle_release(&self, cmd: &ReleaseStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_mutable(cmd.tenant_id, cmd.item_id)?;
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("release quantity must be positive"));
        }
        let released = cmd.quantity.min(self.reserved_stock);
        if released == 0 {
            return Ok(vec![]);
        }

        Ok(vec![self.movement(MovementDraft {
            tenant_id: cmd.tenant_id,
            movement_id: cmd.movement_id,
            movement_type: MovementType::Release,
            quantity: 0,
            reserved_delta: -released,
            unit_cost: None,
            reason: "reservation released",
            reference: cmd.reference.as_deref(),
            reverses: None,
            occurred_at: cmd.occurred_at,
        })?])
    }

    fn handle_reverse(&self, cmd: &ReverseMovement) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_mutable(cmd.tenant_id, cmd.item_id)?;
        let original = &cmd.original;
        if original.item_id != self.id || original.tenant_id != cmd.tenant_id {
            return Err(DomainError::invariant("movement belongs to a different item"));
        }
        original.ensure_reversible()?;

        Ok(vec![self.movement(MovementDraft {
            tenant_id: cmd.tenant_id,
            movement_id: cmd.movement_id,
            movement_type: original.movement_type.reversal(),
            quantity: -original.quantity,
            reserved_delta: -original.reserved_delta,
            unit_cost: original.unit_cost,
            reason: &cmd.reason,
            reference: original.reference.as_deref(),
            reverses: Some(original.id),
            occurred_at: cmd.occurred_at,
        })?])
    }

    fn handle_set_price(&self, cmd: &SetPrice) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_mutable(cmd.tenant_id, cmd.item_id)?;
        if cmd.price.is_sign_negative() {
            return Err(DomainError::validation("price cannot be negative"));
        }
        if self.price == Some(cmd.price) {
            return Ok(vec![]);
        }
        Ok(vec![InventoryEvent::PriceChanged(PriceChanged {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            previous_price: self.price,
            new_price: cmd.price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_thresholds(&self, cmd: &UpdateThresholds) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_mutable(cmd.tenant_id, cmd.item_id)?;
        cmd.thresholds.validate()?;
        Ok(vec![InventoryEvent::ThresholdsUpdated(ThresholdsUpdated {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            thresholds: cmd.thresholds,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("inventory item {}", cmd.item_id)));
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_item_id(cmd.item_id)?;
        if !self.active {
            return Err(DomainError::conflict("item already deactivated"));
        }
        Ok(vec![InventoryEvent::ItemDeactivated(ItemDeactivated {
            tenant_id: cmd.tenant_id,
            item_id: cmd.item_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
