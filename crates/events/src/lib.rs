//! Event mechanics shared by the automation core.
//!
//! - [`Event`]: immutable, versioned facts (inventory changes, automation triggers)
//! - [`EventEnvelope`]: tenant + stream metadata around a payload
//! - [`EventBus`]: transport-agnostic pub/sub, with an in-memory implementation
//! - [`execute`]: decide-then-apply helper for aggregates

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use tenant::TenantScoped;
