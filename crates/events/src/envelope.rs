use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockpilot_core::{AggregateId, TenantId};

use crate::Event;

/// Envelope for an event, carrying tenant and correlation metadata.
///
/// This is the unit that travels over an [`crate::EventBus`]. The payload stays typed;
/// envelopes are cheap to clone for fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant_id: TenantId,

    /// Aggregate the event is about, when there is exactly one.
    aggregate_id: Option<AggregateId>,

    /// When the envelope was handed to the bus.
    published_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(tenant_id: TenantId, payload: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id: None,
            published_at: Utc::now(),
            payload,
        }
    }

    pub fn with_aggregate(mut self, aggregate_id: AggregateId) -> Self {
        self.aggregate_id = Some(aggregate_id);
        self
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn aggregate_id(&self) -> Option<AggregateId> {
        self.aggregate_id
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}
